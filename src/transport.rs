use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::{header, Client, StatusCode};
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::error::TransportError;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, Clone, Copy)]
pub struct HeadResponse {
    pub status: StatusCode,
    pub content_length: Option<u64>,
}

pub struct RangeResponse {
    pub status: StatusCode,
    pub body: BodyStream,
}

/// The slice of HTTP the downloader needs. Implementations follow redirects
/// and apply timeouts on their own.
pub trait Transport: Clone + Send + Sync + 'static {
    /// `HEAD` the resource, reporting the raw `Content-Length` header.
    fn head(&self, url: &Url)
        -> impl Future<Output = Result<HeadResponse, TransportError>> + Send;

    /// `GET` the resource with the given `Range` header value.
    fn get(
        &self,
        url: &Url,
        range: &str,
    ) -> impl Future<Output = Result<RangeResponse, TransportError>> + Send;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("rfetch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn head(&self, url: &Url) -> Result<HeadResponse, TransportError> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(TransportError::Request)?;

        // content_length() reports the (empty) body size for HEAD, so read the header.
        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        Ok(HeadResponse {
            status: response.status(),
            content_length,
        })
    }

    async fn get(&self, url: &Url, range: &str) -> Result<RangeResponse, TransportError> {
        let request = self
            .client
            .get(url.clone())
            .header(header::RANGE, range)
            .build()
            .map_err(TransportError::Build)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(TransportError::Request)?;

        let status = response.status();
        let body = response.bytes_stream().map_err(TransportError::Request);

        Ok(RangeResponse {
            status,
            body: Box::pin(body),
        })
    }
}

/// Size of one read from a part's response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteEvent {
    pub part: usize,
    pub bytes: usize,
}

/// Wraps a transport so that every response body reports its reads on `events`,
/// tagged with the part this transport was built for.
#[derive(Clone)]
pub struct MeteringTransport<T> {
    inner: T,
    part: usize,
    events: UnboundedSender<ByteEvent>,
}

impl<T: Transport> MeteringTransport<T> {
    pub fn new(inner: T, part: usize, events: UnboundedSender<ByteEvent>) -> Self {
        Self {
            inner,
            part,
            events,
        }
    }
}

impl<T: Transport> Transport for MeteringTransport<T> {
    async fn head(&self, url: &Url) -> Result<HeadResponse, TransportError> {
        self.inner.head(url).await
    }

    async fn get(&self, url: &Url, range: &str) -> Result<RangeResponse, TransportError> {
        let response = self.inner.get(url, range).await?;
        Ok(RangeResponse {
            status: response.status,
            body: Box::pin(MeteredBody::new(response.body, self.part, self.events.clone())),
        })
    }
}

/// Read-through counter over a response body.
pub struct MeteredBody {
    inner: BodyStream,
    part: usize,
    events: UnboundedSender<ByteEvent>,
}

impl MeteredBody {
    pub fn new(inner: BodyStream, part: usize, events: UnboundedSender<ByteEvent>) -> Self {
        Self {
            inner,
            part,
            events,
        }
    }

    fn publish(&self, bytes: usize) {
        // Receiver gone means nobody is watching progress anymore; the body still flows.
        if self
            .events
            .send(ByteEvent {
                part: self.part,
                bytes,
            })
            .is_err()
        {
            tracing::trace!(part = self.part, bytes, "progress receiver closed");
        }
    }
}

impl Stream for MeteredBody {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.publish(chunk.len()),
            Poll::Ready(Some(Err(_))) => this.publish(0),
            _ => {}
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
