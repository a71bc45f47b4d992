//! Header hygiene across redirect hops.

use http::header::{AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue};
use url::Url;

/// Strip credentials when a redirect leaves the origin that received them.
pub(crate) fn remove_sensitive_headers(headers: &mut HeaderMap, next: &Url, previous: &[Url]) {
    let Some(previous) = previous.last() else {
        return;
    };
    let cross_host = next.host_str() != previous.host_str()
        || next.port_or_known_default() != previous.port_or_known_default();
    if cross_host {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
        headers.remove("cookie2");
        headers.remove(PROXY_AUTHORIZATION);
        headers.remove(WWW_AUTHENTICATE);
    }
}

/// Referer value for the next hop. Suppressed on an https to http downgrade,
/// and never carries credentials or fragments.
pub(crate) fn make_referer(next: &Url, previous: &Url) -> Option<HeaderValue> {
    if next.scheme() == "http" && previous.scheme() == "https" {
        return None;
    }

    let mut referer = previous.clone();
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    referer.set_fragment(None);
    referer.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_host_strips_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        headers.insert(COOKIE, HeaderValue::from_static("session=1"));
        let next = Url::parse("http://other.example.com/").unwrap();
        let previous = [Url::parse("http://example.com/").unwrap()];
        remove_sensitive_headers(&mut headers, &next, &previous);
        assert!(headers.is_empty());
    }

    #[test]
    fn same_host_keeps_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        let next = Url::parse("http://example.com/elsewhere").unwrap();
        let previous = [Url::parse("http://example.com/").unwrap()];
        remove_sensitive_headers(&mut headers, &next, &previous);
        assert!(headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn port_change_counts_as_cross_host() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        let next = Url::parse("http://example.com:8080/").unwrap();
        let previous = [Url::parse("http://example.com/").unwrap()];
        remove_sensitive_headers(&mut headers, &next, &previous);
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn referer_never_downgrades_or_leaks() {
        let https = Url::parse("https://user:pw@example.com/a#frag").unwrap();
        let http = Url::parse("http://example.com/b").unwrap();
        assert!(make_referer(&http, &https).is_none());

        let next = Url::parse("https://example.com/b").unwrap();
        let referer = make_referer(&next, &https).unwrap();
        assert_eq!(referer, "https://example.com/a");
    }
}
