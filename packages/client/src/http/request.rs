//! Request specification.
//!
//! A [`RequestSpec`] is handed to the caller's configure callback by
//! reference, mutated there, and frozen the moment the client dispatches it.
//! Freezing resolves the body to its wire form and rejects anything that
//! cannot legally go on the wire, before a connection is touched.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::error::{HttpError, Result};
use crate::streaming::ChunkStream;

/// A request under construction.
pub struct RequestSpec {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
    pub(crate) timeout: Option<Duration>,
    pub(crate) follow_redirects: Option<bool>,
    pub(crate) max_redirects: Option<u32>,
}

/// Request body variants.
pub enum RequestBody {
    /// No body.
    Empty,
    /// Raw bytes.
    Bytes(Bytes),
    /// Text content, sent as `text/plain; charset=utf-8` unless the spec
    /// already carries a Content-Type.
    Text(String),
    /// JSON value, serialized at dispatch.
    Json(serde_json::Value),
    /// Form data, urlencoded at dispatch.
    Form(HashMap<String, String>),
    /// A lazy chunk sequence, written with chunked transfer encoding and
    /// backpressure. Not replayable across redirects.
    Stream(ChunkStream),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Text(t) => write!(f, "Text({} chars)", t.len()),
            RequestBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            RequestBody::Form(m) => write!(f, "Form({} fields)", m.len()),
            RequestBody::Stream(_) => f.write_str("Stream(<chunks>)"),
        }
    }
}

impl RequestSpec {
    pub(crate) fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            follow_redirects: None,
            max_redirects: None,
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The headers accumulated so far.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body set so far.
    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Override the method.
    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Append a header. Invalid names or values are ignored with a warning,
    /// so a bad header cannot poison an otherwise valid request.
    pub fn header<K, V>(&mut self, name: K, value: V) -> &mut Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!("ignoring invalid header on request to {}", self.url),
        }
        self
    }

    /// Mutable access to the header map.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Per-request timeout covering the whole exchange.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override whether redirects are followed for this request.
    pub fn follow_redirects(&mut self, follow: bool) -> &mut Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Override the redirect hop limit for this request.
    pub fn max_redirects(&mut self, max: u32) -> &mut Self {
        self.max_redirects = Some(max);
        self
    }

    /// Set the body.
    pub fn set_body(&mut self, body: RequestBody) -> &mut Self {
        self.body = body;
        self
    }

    /// Set the body to raw bytes.
    pub fn body_bytes<B: Into<Bytes>>(&mut self, body: B) -> &mut Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Set the body to text.
    pub fn body_text<S: Into<String>>(&mut self, body: S) -> &mut Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    /// Set the body to a JSON-serializable value.
    pub fn body_json<T: serde::Serialize>(&mut self, body: &T) -> &mut Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = RequestBody::Json(value),
            Err(e) => {
                tracing::warn!("ignoring unserializable JSON body: {e}");
            }
        }
        self
    }

    /// Set the body to an urlencoded form.
    pub fn body_form(&mut self, form: HashMap<String, String>) -> &mut Self {
        self.body = RequestBody::Form(form);
        self
    }

    /// Set the body to a lazy chunk sequence.
    pub fn body_stream(&mut self, stream: ChunkStream) -> &mut Self {
        self.body = RequestBody::Stream(stream);
        self
    }

    /// Check the URL is something this client can speak to. Runs before any
    /// network I/O.
    pub(crate) fn validate(&self) -> Result<()> {
        match self.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(HttpError::invalid_request(format!(
                    "unsupported scheme `{other}`: only http and https are allowed"
                )));
            }
        }
        if self.url.host_str().is_none() {
            return Err(HttpError::invalid_request("url has no host"));
        }
        Ok(())
    }

    /// Freeze into dispatchable parts, resolving the body to wire form and
    /// defaulting Content-Type where the body implies one.
    pub(crate) fn freeze(self) -> Result<FrozenRequest> {
        let RequestSpec {
            method,
            url,
            mut headers,
            body,
            ..
        } = self;

        let (wire, implied_type): (WireBody, Option<&'static str>) = match body {
            RequestBody::Empty => (WireBody::Empty, None),
            RequestBody::Bytes(b) => (WireBody::Full(b), None),
            RequestBody::Text(t) => (
                WireBody::Full(Bytes::from(t)),
                Some("text/plain; charset=utf-8"),
            ),
            RequestBody::Json(v) => {
                let encoded = serde_json::to_vec(&v).map_err(|e| {
                    HttpError::invalid_request(format!("failed to serialize JSON body: {e}"))
                })?;
                (WireBody::Full(Bytes::from(encoded)), Some("application/json"))
            }
            RequestBody::Form(form) => {
                let encoded = serde_urlencoded::to_string(&form).map_err(|e| {
                    HttpError::invalid_request(format!("failed to encode form body: {e}"))
                })?;
                (
                    WireBody::Full(Bytes::from(encoded)),
                    Some("application/x-www-form-urlencoded"),
                )
            }
            RequestBody::Stream(s) => (WireBody::Stream(Some(s)), None),
        };

        if let Some(content_type) = implied_type {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        Ok(FrozenRequest {
            method,
            url,
            headers,
            body: wire,
        })
    }
}

/// A dispatched request: immutable except for the redirect loop rewriting
/// method, url, and headers between hops.
pub(crate) struct FrozenRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: WireBody,
}

/// Body in wire form.
pub(crate) enum WireBody {
    Empty,
    Full(Bytes),
    /// The stream is taken out when written; a second send attempt (redirect
    /// replay) finds `None` and fails.
    Stream(Option<ChunkStream>),
}

impl WireBody {
    pub(crate) fn is_replayable(&self) -> bool {
        !matches!(self, WireBody::Stream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str) -> RequestSpec {
        RequestSpec::new(Method::GET, Url::parse(url).unwrap())
    }

    #[test]
    fn validate_rejects_non_http_schemes() {
        assert!(spec("ftp://example.com/x").validate().is_err());
        assert!(spec("file:///etc/hosts").validate().is_err());
        assert!(spec("http://example.com/x").validate().is_ok());
        assert!(spec("https://example.com/x").validate().is_ok());
    }

    #[test]
    fn text_body_implies_content_type() {
        let mut s = spec("http://example.com/");
        s.body_text("foo");
        let frozen = s.freeze().unwrap();
        assert_eq!(
            frozen.headers.get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        match frozen.body {
            WireBody::Full(b) => assert_eq!(&b[..], b"foo"),
            _ => panic!("expected full body"),
        }
    }

    #[test]
    fn explicit_content_type_wins() {
        let mut s = spec("http://example.com/");
        s.header(CONTENT_TYPE, "application/xml");
        s.body_text("<a/>");
        let frozen = s.freeze().unwrap();
        assert_eq!(frozen.headers.get(CONTENT_TYPE).unwrap(), "application/xml");
    }

    #[test]
    fn json_body_serializes_at_freeze() {
        let mut s = spec("http://example.com/");
        s.body_json(&serde_json::json!({"k": 1}));
        let frozen = s.freeze().unwrap();
        match frozen.body {
            WireBody::Full(b) => assert_eq!(&b[..], br#"{"k":1}"#),
            _ => panic!("expected full body"),
        }
    }
}
