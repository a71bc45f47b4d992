//! Streamed response bodies.
//!
//! The streaming path never buffers a whole body. A background task reads
//! from the connection and feeds a channel with capacity for a single chunk,
//! so a slow consumer stalls the socket read instead of growing a queue.
//! Dropping the [`BodyStream`] drops the channel, the producer's next send
//! fails, and the connection is closed rather than pooled with unread bytes.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, StatusCode, Version};
use tokio::sync::mpsc;

use crate::error::Result;

/// A boxed chunk sequence, used for lazy request bodies.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// One in-flight chunk of backpressure between the connection reader and the
/// consumer.
const STREAM_DEPTH: usize = 1;

pub(crate) fn body_channel() -> (mpsc::Sender<Result<Bytes>>, BodyStream) {
    let (tx, rx) = mpsc::channel(STREAM_DEPTH);
    (tx, BodyStream { rx })
}

/// The body of a streamed response, yielded chunk by chunk.
pub struct BodyStream {
    rx: mpsc::Receiver<Result<Bytes>>,
}

impl Stream for BodyStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BodyStream")
    }
}

/// A destination for a forwarded response.
///
/// `start` is called once with the head, `chunk` once per body chunk in
/// order, and `finish` once after the final chunk. Any error aborts the
/// forward and closes the underlying connection.
#[allow(async_fn_in_trait)]
pub trait ResponseSink {
    async fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<()>;
    async fn chunk(&mut self, chunk: Bytes) -> Result<()>;
    async fn finish(&mut self) -> Result<()>;
}

/// A response whose head has arrived but whose body is still on the wire.
#[derive(Debug)]
pub struct StreamedResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: BodyStream,
}

impl StreamedResponse {
    pub(crate) fn new(
        status: StatusCode,
        version: Version,
        headers: HeaderMap,
        body: BodyStream,
    ) -> Self {
        Self {
            status,
            version,
            headers,
            body,
        }
    }

    /// The response status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The negotiated HTTP version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The Content-Type header, if present and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// The declared Content-Length, if present and numeric. Chunked bodies
    /// have none.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Consume the response, keeping only the body stream.
    #[must_use]
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Split into head parts and body stream.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, Version, HeaderMap, BodyStream) {
        (self.status, self.version, self.headers, self.body)
    }

    /// Drive the whole response into a sink, chunk by chunk, propagating the
    /// sink's backpressure to the socket.
    pub async fn forward<S: ResponseSink>(self, sink: &mut S) -> Result<()> {
        self.forward_with(sink, |_| {}).await
    }

    /// Like [`forward`](Self::forward), but lets the caller rewrite the
    /// outgoing headers before the sink sees them.
    pub async fn forward_with<S: ResponseSink>(
        mut self,
        sink: &mut S,
        adjust: impl FnOnce(&mut HeaderMap),
    ) -> Result<()> {
        adjust(&mut self.headers);
        sink.start(self.status, &self.headers).await?;
        while let Some(chunk) = self.body.next().await {
            sink.chunk(chunk?).await?;
        }
        sink.finish().await
    }
}
