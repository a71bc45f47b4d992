//! The [`RequestBuilder`] struct and its foundational methods.
//!
//! Header, auth, and body setters live in sibling modules; the terminal
//! methods that actually issue the request are in `methods`.

use std::fmt;
use std::time::Duration;

use http::HeaderMap;
use peregrine_client::{HttpClient, RequestBody};

use crate::default_client;

/// Accumulates a request fluently, then executes it with one of the terminal
/// methods (`get`, `post`, `put`, `patch`, `delete`, `head`, `stream`).
///
/// Each builder issues exactly one request; the underlying client and its
/// connection pool are shared and reusable.
pub struct RequestBuilder {
    pub(crate) client: HttpClient,
    pub(crate) headers: HeaderMap,
    pub(crate) body: RequestBody,
    pub(crate) timeout: Option<Duration>,
    pub(crate) follow_redirects: Option<bool>,
    pub(crate) max_redirects: Option<u32>,
}

impl RequestBuilder {
    /// Build against the process-wide shared client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(default_client().clone())
    }

    /// Build against a specific client.
    #[must_use]
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            follow_redirects: None,
            max_redirects: None,
        }
    }

    /// Per-request timeout covering the whole exchange.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override whether redirects are followed.
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Override the redirect hop limit.
    #[must_use]
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
