use std::io;

use futures::StreamExt;
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result, TransportError};
use crate::plan::Part;
use crate::transport::Transport;

/// Downloads one [`Part`] into its sidecar file.
pub struct PartFetcher<T> {
    transport: T,
    url: Url,
    part: Part,
    cancel: CancellationToken,
}

impl<T: Transport> PartFetcher<T> {
    pub fn new(transport: T, url: Url, part: Part, cancel: CancellationToken) -> Self {
        Self {
            transport,
            url,
            part,
            cancel,
        }
    }

    /// Fetches the part and reports a failure on `errors`. The caller treats
    /// the task finishing as the part's completion signal.
    pub async fn run(self, errors: mpsc::Sender<Error>) {
        let id = self.part.id;
        match self.fetch().await {
            Ok(written) => info!(part = id, bytes = written, "part finished"),
            Err(e) => {
                warn!(part = id, error = %e, "part failed");
                // Sized to the part count and each fetcher reports once, so this never waits.
                if errors.try_send(e).is_err() {
                    warn!(part = id, "error channel unavailable");
                }
            }
        }
    }

    /// Returns the number of bytes written to the sidecar.
    pub async fn fetch(&self) -> Result<u64> {
        let part = &self.part;
        let id = part.id;
        let range = part.range_header();
        debug!(part = id, %range, "requesting");

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled { part: Some(id) }),
            response = self.transport.get(&self.url, &range) => response.map_err(|source| match source {
                TransportError::Build(_) => Error::RequestBuild { part: id, source },
                source => Error::Transport { part: Some(id), source },
            })?,
        };

        if response.status != StatusCode::PARTIAL_CONTENT {
            return Err(Error::HttpStatus {
                part: Some(id),
                status: response.status,
            });
        }

        let mut file = File::create(&part.file_path)
            .await
            .map_err(|source| Error::SidecarCreate {
                part: id,
                path: part.file_path.clone(),
                source,
            })?;

        let mut body = response.body;
        let mut written = 0u64;
        let copy_error = |written, source| Error::Copy {
            part: id,
            written,
            source,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled { part: Some(id) }),
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| copy_error(written, e))?;
                    written += chunk.len() as u64;
                }
                Some(Err(e)) => return Err(copy_error(written, into_io(e))),
                None => break,
            }
        }

        file.flush().await.map_err(|e| copy_error(written, e))?;
        Ok(written)
    }
}

fn into_io(err: TransportError) -> io::Error {
    match err {
        TransportError::Io(e) => e,
        other => io::Error::other(other),
    }
}
