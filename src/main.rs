mod cli;
mod config;
mod downloader;
mod error;
mod fetcher;
mod logging;
mod merge;
mod plan;
mod progress;
mod render;
mod transport;
mod utils;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::Args;
use crate::downloader::Downloader;
use crate::transport::ReqwestTransport;

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        // Ctrl+C cancels the requests instead of killing the process, so sidecars get cleaned up.
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling download");
                interrupt.cancel();
            }
        });

        let transport = ReqwestTransport::new().context("Failed to set up HTTP client")?;
        let summary = Downloader::new(transport, config, cancel).run().await?;
        println!("{}", summary);
        Ok(())
    })
}
