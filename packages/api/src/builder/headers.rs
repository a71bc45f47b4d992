//! Header setters.

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderName, HeaderValue};

use super::core::RequestBuilder;

impl RequestBuilder {
    /// Append a header. Invalid names or values are ignored with a warning.
    #[must_use]
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!("ignoring invalid header"),
        }
        self
    }

    /// Set the Content-Type header.
    #[must_use]
    pub fn content_type(self, value: &str) -> Self {
        self.header(CONTENT_TYPE, value)
    }

    /// Set the Accept header.
    #[must_use]
    pub fn accept(self, value: &str) -> Self {
        self.header(ACCEPT, value)
    }
}
