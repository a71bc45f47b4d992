//! Conversion of caller-supplied values into a parsed [`Url`].

use url::Url;

use crate::error::{HttpError, Result};

/// Types that can be turned into a request URL.
///
/// Parse failures surface as `InvalidRequest` before any asynchronous work
/// begins. Scheme validation happens separately at dispatch, so a `Url` that
/// parses but uses an unsupported scheme is still rejected there.
pub trait IntoUrl {
    fn into_url(self) -> Result<Url>;
}

impl IntoUrl for Url {
    fn into_url(self) -> Result<Url> {
        Ok(self)
    }
}

impl IntoUrl for &str {
    fn into_url(self) -> Result<Url> {
        Url::parse(self)
            .map_err(|e| HttpError::invalid_request(format!("invalid url `{self}`: {e}")))
    }
}

impl IntoUrl for String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}

impl IntoUrl for &String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_str_and_url() {
        assert!("http://example.com/a".into_url().is_ok());
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(url.clone().into_url().unwrap(), url);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not a url".into_url().unwrap_err();
        assert!(matches!(err, HttpError::InvalidRequest(_)));
    }
}
