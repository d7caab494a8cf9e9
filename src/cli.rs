use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::utils::{default_output_dir, output_file_name, parse_url};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download one file over several parallel range requests", long_about = None)]
pub struct Args {
    /// URL of the file to download
    #[arg(index = 1)]
    pub url: String,

    /// Output file name (defaults to the last segment of the URL)
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Directory to save the file in (defaults to the home directory)
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// Number of parallel range requests
    #[arg(short = 'n', long, default_value = "4")]
    pub parts: NonZeroUsize,

    /// Give up on the whole download after this many seconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Don't draw the live progress display
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// More log output on stderr (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn into_config(self) -> Result<DownloadConfig> {
        let url = parse_url(&self.url)?;
        let file_name = output_file_name(&url, self.output.as_deref())?;
        let output_dir = self.dir.unwrap_or_else(default_output_dir);

        let mut config = DownloadConfig::new(url, file_name, output_dir);
        config.parts = self.parts.get();
        config.timeout = self.timeout.map(Duration::from_secs);
        config.show_progress = !self.quiet;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PARTS;
    use crate::error::Error;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("rfetch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn url_only_uses_defaults() {
        let config = parse(&["https://host/pub/file.iso"]).into_config().unwrap();
        assert_eq!(config.file_name, "file.iso");
        assert_eq!(config.parts, DEFAULT_PARTS);
        assert_eq!(config.timeout, None);
        assert!(config.show_progress);
        assert_eq!(config.output_path(), default_output_dir().join("file.iso"));
    }

    #[test]
    fn url_may_follow_the_flags() {
        let config = parse(&["-o", "archive.", "-d", "/tmp/dl", "https://host/x.tar.gz"])
            .into_config()
            .unwrap();
        assert_eq!(config.output_path(), PathBuf::from("/tmp/dl/archive.tar.gz"));
    }

    #[test]
    fn tuning_flags() {
        let config = parse(&["-n", "8", "-t", "30", "-q", "-vv", "https://host/a.bin"]);
        assert_eq!(config.verbose, 2);
        let config = config.into_config().unwrap();
        assert_eq!(config.parts, 8);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(!config.show_progress);
    }

    #[test]
    fn zero_parts_is_rejected_by_the_parser() {
        assert!(Args::try_parse_from(["rfetch", "-n", "0", "https://host/a"]).is_err());
    }

    #[test]
    fn missing_url_is_rejected_by_the_parser() {
        assert!(Args::try_parse_from(["rfetch"]).is_err());
    }

    #[test]
    fn bad_url_is_invalid_url() {
        let err = parse(&["::nope::"]).into_config().unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
