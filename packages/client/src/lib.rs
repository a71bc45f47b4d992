//! # Peregrine client engine
//!
//! An asynchronous HTTP/1.1 client built on Tokio and rustls, with keep-alive
//! connection pooling, capped body aggregation, and backpressured response
//! streaming.
//!
//! - **Connection pooling** keyed by (scheme, host, port), with per-host
//!   caps, an idle sweeper, and fair handoff to queued waiters
//! - **Buffered requests** aggregate the body under a configurable cap and
//!   fail with `ContentTooLarge` instead of truncating
//! - **Streamed requests** yield the body chunk by chunk; a slow consumer
//!   stalls the socket instead of growing a queue
//! - **Redirects** followed by policy, with credential stripping across hosts
//! - **Rustls TLS** with webpki roots, no native dependencies
//!
//! The higher-level `peregrine` crate wraps this engine in a fluent builder;
//! most applications want that instead.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub(crate) mod connect;
pub mod error;
pub mod http;
pub(crate) mod pool;
pub(crate) mod protocols;
pub mod redirect;
pub mod streaming;

pub use client::{HttpClient, PoolStats};
pub use config::{BufferConfig, HttpConfig};
pub use error::{HttpError, Result};
pub use http::{IntoUrl, ReceivedResponse, RequestBody, RequestSpec};
pub use streaming::{BodyStream, ChunkStream, ResponseSink, StreamedResponse};
