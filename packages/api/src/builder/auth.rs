//! Authorization header helpers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;

use super::core::RequestBuilder;

impl RequestBuilder {
    /// Set a `Bearer` Authorization header.
    #[must_use]
    pub fn bearer_auth(self, token: &str) -> Self {
        self.header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Set a `Basic` Authorization header from a username and optional
    /// password.
    #[must_use]
    pub fn basic_auth(self, username: &str, password: Option<&str>) -> Self {
        let credentials = format!("{username}:{}", password.unwrap_or(""));
        let encoded = STANDARD.encode(credentials);
        self.header(AUTHORIZATION, format!("Basic {encoded}"))
    }
}
