//! Client configuration.
//!
//! All knobs are plain struct fields supplied at construction time; there is
//! no runtime service lookup. `validate()` catches configurations that would
//! make the engine misbehave before any request is issued.

mod buffers;

use std::time::Duration;

pub use buffers::{BufferConfig, BufferPool};

use crate::redirect::Policy;

/// Configuration for an [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Cap on buffered response bodies, in bytes. Streamed responses are
    /// never capped.
    pub max_content_length: usize,
    /// Maximum simultaneously active connections per (scheme, host, port).
    pub pool_max_per_host: usize,
    /// Maximum idle connections retained per (scheme, host, port).
    pub pool_max_idle_per_host: usize,
    /// Idle connections older than this are evicted by the background sweep.
    pub pool_idle_timeout: Duration,
    /// How long a checkout may wait for pool capacity before failing with
    /// `QueueTimeout`. `None` waits indefinitely.
    pub pool_acquire_timeout: Option<Duration>,
    /// Default per-request timeout covering the whole buffered exchange.
    pub request_timeout: Duration,
    /// Timeout for DNS resolution + TCP connect + TLS handshake.
    pub connect_timeout: Duration,
    /// Redirect policy applied when a request does not override it.
    pub redirect: Policy,
    /// Whether to set a Referer header when following redirects.
    pub referer: bool,
    /// Value of the User-Agent header added when the request has none.
    pub user_agent: String,
    /// Disable Nagle's algorithm on new sockets.
    pub tcp_nodelay: bool,
    /// TCP keepalive probe interval, if any.
    pub tcp_keepalive: Option<Duration>,
    /// Read-buffer pool sizing.
    pub buffers: BufferConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_content_length: 1_048_576, // 1MB
            pool_max_per_host: 32,
            pool_max_idle_per_host: 8,
            pool_idle_timeout: Duration::from_secs(90),
            pool_acquire_timeout: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            redirect: Policy::default(),
            referer: true,
            user_agent: concat!("peregrine/", env!("CARGO_PKG_VERSION")).to_string(),
            tcp_nodelay: true,
            tcp_keepalive: Some(Duration::from_secs(60)),
            buffers: BufferConfig::default(),
        }
    }
}

impl HttpConfig {
    /// Preset tuned for many small exchanges against few hosts: tighter
    /// timeouts, a deeper idle set, aggressive keepalive.
    #[must_use]
    pub fn low_latency() -> Self {
        Self {
            pool_max_idle_per_host: 16,
            pool_idle_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            tcp_keepalive: Some(Duration::from_secs(30)),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending field.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than zero".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than zero".to_string());
        }
        if self.pool_max_per_host == 0 {
            return Err("pool_max_per_host must be greater than zero".to_string());
        }
        if self.pool_max_idle_per_host > self.pool_max_per_host {
            return Err("pool_max_idle_per_host must not exceed pool_max_per_host".to_string());
        }
        if self.pool_idle_timeout.is_zero() {
            return Err("pool_idle_timeout must be greater than zero".to_string());
        }
        if self.user_agent.is_empty() {
            return Err("user_agent cannot be empty".to_string());
        }
        self.buffers.validate()
    }
}
