//! Body setters.

use std::collections::HashMap;

use bytes::Bytes;
use peregrine_client::{ChunkStream, RequestBody};

use super::core::RequestBuilder;

impl RequestBuilder {
    /// Send raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Send text as `text/plain`.
    #[must_use]
    pub fn body_text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    /// Send a value as JSON. Values that fail to serialize are ignored with
    /// a warning, leaving the body unset.
    #[must_use]
    pub fn body_json<T: serde::Serialize>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = RequestBody::Json(value),
            Err(e) => tracing::warn!("ignoring unserializable JSON body: {e}"),
        }
        self
    }

    /// Send an urlencoded form.
    #[must_use]
    pub fn body_form(mut self, form: HashMap<String, String>) -> Self {
        self.body = RequestBody::Form(form);
        self
    }

    /// Send a lazy chunk sequence with chunked transfer encoding.
    #[must_use]
    pub fn body_stream(mut self, stream: ChunkStream) -> Self {
        self.body = RequestBody::Stream(stream);
        self
    }
}
