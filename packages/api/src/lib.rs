//! # Peregrine
//!
//! An asynchronous HTTP/1.1 client with keep-alive connection pooling,
//! capped response aggregation, and backpressured streaming.
//!
//! The free functions use a process-wide shared client; the
//! [`RequestBuilder`] offers a fluent surface over either the shared client
//! or one you configure yourself.
//!
//! ```no_run
//! use peregrine::RequestBuilder;
//!
//! # async fn run() -> peregrine::Result<()> {
//! let body = peregrine::get("https://example.com/status").await?.text();
//!
//! let response = RequestBuilder::new()
//!     .header("accept", "application/json")
//!     .bearer_auth("token")
//!     .get("https://api.example.com/users")
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

use std::sync::OnceLock;

pub mod builder;

pub use builder::RequestBuilder;
pub use peregrine_client::redirect;
pub use peregrine_client::{
    BodyStream, BufferConfig, ChunkStream, HttpClient, HttpConfig, HttpError, IntoUrl, PoolStats,
    ReceivedResponse, RequestBody, RequestSpec, ResponseSink, Result, StreamedResponse,
};

static DEFAULT_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// The process-wide shared client with default configuration.
///
/// The first call must happen inside a Tokio runtime, since it spawns the
/// pool's idle sweeper.
pub fn default_client() -> &'static HttpClient {
    DEFAULT_CLIENT.get_or_init(HttpClient::new)
}

/// GET a URL with the shared client and aggregate the body.
pub async fn get(url: impl IntoUrl) -> Result<ReceivedResponse> {
    default_client().get(url).await
}

/// GET a URL with the shared client and a configured request.
pub async fn get_with(
    url: impl IntoUrl,
    configure: impl FnOnce(&mut RequestSpec),
) -> Result<ReceivedResponse> {
    default_client().get_with(url, configure).await
}

/// POST to a URL with the shared client.
pub async fn post(
    url: impl IntoUrl,
    configure: impl FnOnce(&mut RequestSpec),
) -> Result<ReceivedResponse> {
    default_client().post(url, configure).await
}

/// Issue a configured request with the shared client.
pub async fn request(
    url: impl IntoUrl,
    configure: impl FnOnce(&mut RequestSpec),
) -> Result<ReceivedResponse> {
    default_client().request(url, configure).await
}

/// Issue a configured request with the shared client, streaming the body.
pub async fn request_stream(
    url: impl IntoUrl,
    configure: impl FnOnce(&mut RequestSpec),
) -> Result<StreamedResponse> {
    default_client().request_stream(url, configure).await
}
