use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures raised by a [`crate::transport::Transport`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{0}")]
    Request(#[source] reqwest::Error),

    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("download link is not valid ({input}): {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("server did not report a usable Content-Length")]
    UnknownSize,

    #[error("cannot split {file_size} bytes into {parts} parts")]
    InvalidPlan { file_size: u64, parts: usize },

    #[error("part #{part}: {source}")]
    RequestBuild {
        part: usize,
        #[source]
        source: TransportError,
    },

    #[error("{}{}", part_prefix(.part), .source)]
    Transport {
        part: Option<usize>,
        #[source]
        source: TransportError,
    },

    #[error("{}unexpected HTTP status {}", part_prefix(.part), .status)]
    HttpStatus {
        part: Option<usize>,
        status: StatusCode,
    },

    #[error("part #{part}: failed to create {path:?}: {source}")]
    SidecarCreate {
        part: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("part #{part}: transfer failed after {written} bytes: {source}")]
    Copy {
        part: usize,
        written: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {path:?} for merging: {source}")]
    MergeOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path:?} while merging: {source}")]
    MergeRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path:?} while merging: {source}")]
    MergeWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {path:?}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}cancelled", part_prefix(.part))]
    Cancelled { part: Option<usize> },

    #[error("part #{part}: fetch task failed: {reason}")]
    TaskFailed { part: usize, reason: String },

    #[error("{failed} of {total} parts failed")]
    PartsFailed { failed: usize, total: usize },
}

impl Error {
    /// The part a fetch-stage error belongs to.
    pub fn part(&self) -> Option<usize> {
        match self {
            Error::RequestBuild { part, .. }
            | Error::SidecarCreate { part, .. }
            | Error::Copy { part, .. }
            | Error::TaskFailed { part, .. } => Some(*part),
            Error::Transport { part, .. }
            | Error::HttpStatus { part, .. }
            | Error::Cancelled { part } => *part,
            _ => None,
        }
    }
}

fn part_prefix(part: &Option<usize>) -> String {
    match part {
        Some(id) => format!("part #{}: ", id),
        None => String::new(),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
