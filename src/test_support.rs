//! In-memory [`Transport`] serving one resource with range semantics.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use url::Url;

use crate::error::TransportError;
use crate::transport::{BodyStream, HeadResponse, RangeResponse, Transport};

#[derive(Clone)]
pub struct MockTransport {
    data: Bytes,
    chunk_size: usize,
    head_status: StatusCode,
    head_length: Option<u64>,
    range_status: StatusCode,
    /// Range start whose body breaks off after the given number of bytes.
    fail_after: Option<(u64, usize)>,
    /// Range start whose body never finishes.
    stall: Option<u64>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn serving(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            head_length: Some(data.len() as u64),
            data,
            chunk_size: 64,
            head_status: StatusCode::OK,
            range_status: StatusCode::PARTIAL_CONTENT,
            fail_after: None,
            stall: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_head_length(mut self, length: Option<u64>) -> Self {
        self.head_length = length;
        self
    }

    pub fn with_head_status(mut self, status: StatusCode) -> Self {
        self.head_status = status;
        self
    }

    /// Answer every range request with `status` and the whole resource,
    /// like a server that ignores `Range`.
    pub fn with_range_status(mut self, status: StatusCode) -> Self {
        self.range_status = status;
        self
    }

    pub fn failing_after(mut self, range_start: u64, bytes: usize) -> Self {
        self.fail_after = Some((range_start, bytes));
        self
    }

    pub fn stalling(mut self, range_start: u64) -> Self {
        self.stall = Some(range_start);
        self
    }

    pub fn requested_ranges(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn slice(&self, range: &str) -> Result<(u64, Bytes), TransportError> {
        let invalid = || {
            TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad range {range:?}"),
            ))
        };
        let (start, end) = range
            .strip_prefix("bytes=")
            .and_then(|r| r.split_once('-'))
            .ok_or_else(invalid)?;
        let start: u64 = start.parse().map_err(|_| invalid())?;
        let end: u64 = end.parse().map_err(|_| invalid())?;

        let len = self.data.len() as u64;
        let from = start.min(len) as usize;
        let to = end.saturating_add(1).min(len) as usize;
        Ok((start, self.data.slice(from..to.max(from))))
    }

    fn body(&self, start: u64, payload: Bytes) -> BodyStream {
        let mut payload = payload;
        let mut failure = None;
        if let Some((fail_start, after)) = self.fail_after {
            if fail_start == start && after < payload.len() {
                payload.truncate(after);
                failure = Some(Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection closed by peer",
                ))));
            }
        }

        let mut items: Vec<Result<Bytes, TransportError>> = Vec::new();
        while !payload.is_empty() {
            let n = self.chunk_size.min(payload.len());
            items.push(Ok(payload.split_to(n)));
        }
        items.extend(failure);

        let body = stream::iter(items);
        if self.stall == Some(start) {
            Box::pin(body.chain(stream::pending()))
        } else {
            Box::pin(body)
        }
    }
}

impl Transport for MockTransport {
    async fn head(&self, _url: &Url) -> Result<HeadResponse, TransportError> {
        Ok(HeadResponse {
            status: self.head_status,
            content_length: self.head_length,
        })
    }

    async fn get(&self, _url: &Url, range: &str) -> Result<RangeResponse, TransportError> {
        self.requests.lock().unwrap().push(range.to_string());

        if self.range_status != StatusCode::PARTIAL_CONTENT {
            return Ok(RangeResponse {
                status: self.range_status,
                body: self.body(u64::MAX, self.data.clone()),
            });
        }

        let (start, payload) = self.slice(range)?;
        Ok(RangeResponse {
            status: StatusCode::PARTIAL_CONTENT,
            body: self.body(start, payload),
        })
    }
}
