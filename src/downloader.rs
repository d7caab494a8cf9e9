use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use indicatif::{HumanBytes, HumanDuration};
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fetcher::PartFetcher;
use crate::merge::merge_parts;
use crate::plan::{plan_parts, Part};
use crate::progress::{Aggregator, ProgressBoard};
use crate::render::Renderer;
use crate::transport::{MeteringTransport, Transport};

/// What a finished download reports back.
#[derive(Debug, Clone)]
pub struct Summary {
    pub file_name: String,
    pub total_bytes: u64,
    pub directory: PathBuf,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) Downloaded on {} in {}.",
            self.file_name,
            HumanBytes(self.total_bytes),
            self.directory.display(),
            HumanDuration(self.elapsed)
        )
    }
}

pub struct Downloader<T> {
    transport: T,
    config: DownloadConfig,
    cancel: CancellationToken,
}

impl<T: Transport> Downloader<T> {
    pub fn new(transport: T, config: DownloadConfig, cancel: CancellationToken) -> Self {
        Self {
            transport,
            config,
            cancel,
        }
    }

    /// Size probe, planning, parallel fetch, merge and cleanup.
    pub async fn run(&self) -> Result<Summary> {
        // The deadline only cancels this run, never the caller's token.
        let cancel = self.cancel.child_token();
        let deadline = self.config.timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(?timeout, "deadline reached, cancelling");
                cancel.cancel();
            })
        });

        let result = self.download(&cancel).await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }
        result
    }

    async fn download(&self, cancel: &CancellationToken) -> Result<Summary> {
        let started = Instant::now();
        let output_path = self.config.output_path();

        let file_size = self.probe_size(cancel).await?;
        let count = usize::try_from(file_size)
            .unwrap_or(usize::MAX)
            .min(self.config.parts);
        let parts: Arc<[Part]> = plan_parts(file_size, count, &output_path)?.into();
        info!(
            url = %self.config.url,
            file_size,
            parts = parts.len(),
            output = %output_path.display(),
            "starting download"
        );

        let (failures, received) = self.fetch_all(&parts, cancel).await;

        if !failures.is_empty() {
            for e in &failures {
                eprintln!("Error during download: {}", e);
            }
            remove_sidecars(&parts).await;
            return Err(Error::PartsFailed {
                failed: failures.len(),
                total: parts.len(),
            });
        }

        check_metering(&parts, &received).await;

        let merged = merge_parts(&parts, &output_path).await;
        remove_sidecars(&parts).await;
        let total_bytes = merged?;

        Ok(Summary {
            file_name: self.config.file_name.clone(),
            total_bytes,
            directory: self.config.output_dir.clone(),
            elapsed: started.elapsed(),
        })
    }

    async fn probe_size(&self, cancel: &CancellationToken) -> Result<u64> {
        let head = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled { part: None }),
            head = self.transport.head(&self.config.url) => head
                .map_err(|source| Error::Transport { part: None, source })?,
        };

        if !head.status.is_success() {
            return Err(Error::HttpStatus {
                part: None,
                status: head.status,
            });
        }

        match head.content_length {
            Some(length) if length > 0 => {
                debug!(length, "content length");
                Ok(length)
            }
            _ => Err(Error::UnknownSize),
        }
    }

    /// Runs every part to completion. Returns the collected failures and the
    /// per-part byte counts seen by the aggregator.
    async fn fetch_all(
        &self,
        parts: &Arc<[Part]>,
        cancel: &CancellationToken,
    ) -> (Vec<Error>, Vec<u64>) {
        let board = Arc::new(ProgressBoard::new(parts.len()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, mut error_rx) = mpsc::channel(parts.len());
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let aggregator = tokio::spawn(Aggregator::new(board.clone()).run(event_rx));
        let renderer = self
            .config
            .show_progress
            .then(|| tokio::spawn(Renderer::new(parts.clone(), board.clone()).run(done_rx)));

        let handles: Vec<_> = parts
            .iter()
            .map(|part| {
                let transport =
                    MeteringTransport::new(self.transport.clone(), part.id, event_tx.clone());
                let fetcher = PartFetcher::new(
                    transport,
                    self.config.url.clone(),
                    part.clone(),
                    cancel.clone(),
                );
                tokio::spawn(fetcher.run(error_tx.clone()))
            })
            .collect();
        // Fetchers hold the remaining senders; the channels close as they finish.
        drop(event_tx);
        drop(error_tx);

        let mut failures = Vec::new();
        for (part, joined) in parts.iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                failures.push(Error::TaskFailed {
                    part: part.id,
                    reason: e.to_string(),
                });
            }
        }

        drop(done_tx);
        if let Some(renderer) = renderer {
            if let Err(e) = renderer.await {
                warn!(error = %e, "progress display stopped unexpectedly");
            }
        }

        let received = aggregator.await.unwrap_or_else(|e| {
            warn!(error = %e, "progress aggregation stopped unexpectedly");
            vec![0; parts.len()]
        });

        while let Some(e) = error_rx.recv().await {
            failures.push(e);
        }
        failures.sort_by_key(Error::part);

        (failures, received)
    }
}

/// Cross-checks the metered byte counts against the sidecar sizes.
async fn check_metering(parts: &[Part], received: &[u64]) {
    for (part, &metered) in parts.iter().zip(received) {
        match fs::metadata(&part.file_path).await {
            Ok(meta) if meta.len() == metered => {}
            Ok(meta) => warn!(
                part = part.id,
                metered,
                on_disk = meta.len(),
                "metered bytes differ from sidecar size"
            ),
            Err(e) => warn!(part = part.id, error = %e, "cannot stat sidecar"),
        }
    }
}

/// Removes every sidecar that exists. Failures are warnings only.
pub async fn remove_sidecars(parts: &[Part]) {
    for part in parts {
        match fs::remove_file(&part.file_path).await {
            Ok(()) => debug!(part = part.id, "sidecar removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                let e = Error::Cleanup {
                    path: part.file_path.clone(),
                    source,
                };
                warn!("{}", e);
            }
        }
    }
}
