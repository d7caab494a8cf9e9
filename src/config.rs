use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DEFAULT_PARTS: usize = 4;

/// Everything a download run needs, already validated.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub url: Url,
    /// Decoded output filename, without directory.
    pub file_name: String,
    pub output_dir: PathBuf,
    /// Requested number of ranges; fewer are used for resources smaller than this.
    pub parts: usize,
    /// Overall deadline for the run.
    pub timeout: Option<Duration>,
    pub show_progress: bool,
}

impl DownloadConfig {
    pub fn new(url: Url, file_name: String, output_dir: PathBuf) -> Self {
        Self {
            url,
            file_name,
            output_dir,
            parts: DEFAULT_PARTS,
            timeout: None,
            show_progress: true,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }
}
