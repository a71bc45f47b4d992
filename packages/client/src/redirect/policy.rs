//! Redirect policies.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use url::Url;

use super::attempt::{Action, ActionKind, Attempt};

/// Decides, hop by hop, whether a redirect chain continues.
#[derive(Clone)]
pub struct Policy {
    inner: PolicyKind,
}

#[derive(Clone)]
enum PolicyKind {
    /// Follow up to a fixed number of hops, then fail.
    Limit(u32),
    /// Never follow; redirect responses are returned as-is.
    None,
    /// Caller-supplied decision function.
    Custom(Arc<dyn Fn(Attempt<'_>) -> Action + Send + Sync>),
}

impl Policy {
    /// Follow at most `max` redirects, failing the request beyond that.
    #[must_use]
    pub fn limited(max: u32) -> Self {
        Self {
            inner: PolicyKind::Limit(max),
        }
    }

    /// Never follow redirects.
    #[must_use]
    pub fn none() -> Self {
        Self {
            inner: PolicyKind::None,
        }
    }

    /// Decide each hop with the given function.
    pub fn custom<F>(policy: F) -> Self
    where
        F: Fn(Attempt<'_>) -> Action + Send + Sync + 'static,
    {
        Self {
            inner: PolicyKind::Custom(Arc::new(policy)),
        }
    }

    pub(crate) fn check(&self, status: StatusCode, next: &Url, previous: &[Url]) -> ActionKind {
        let attempt = Attempt {
            status,
            next,
            previous,
        };
        match &self.inner {
            PolicyKind::Limit(max) => {
                if previous.len() > *max as usize {
                    attempt
                        .error(TooManyRedirects {
                            limit: *max,
                        })
                        .inner
                } else {
                    attempt.follow().inner
                }
            }
            PolicyKind::None => attempt.stop().inner,
            PolicyKind::Custom(f) => f(attempt).inner,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::limited(10)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            PolicyKind::Limit(max) => f.debug_tuple("Policy::Limit").field(max).finish(),
            PolicyKind::None => f.write_str("Policy::None"),
            PolicyKind::Custom(_) => f.write_str("Policy::Custom"),
        }
    }
}

/// Marker error a limit policy raises past its hop budget, recognized by the
/// dispatch loop so it surfaces with the limit attached.
#[derive(Debug)]
pub(crate) struct TooManyRedirects {
    pub limit: u32,
}

impl fmt::Display for TooManyRedirects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "too many redirects (limit {})", self.limit)
    }
}

impl std::error::Error for TooManyRedirects {}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<Url> {
        (0..n)
            .map(|i| Url::parse(&format!("http://example.com/{i}")).unwrap())
            .collect()
    }

    #[test]
    fn limit_policy_follows_then_errors() {
        let policy = Policy::limited(3);
        let next = Url::parse("http://example.com/next").unwrap();
        assert!(matches!(
            policy.check(StatusCode::FOUND, &next, &urls(2)),
            ActionKind::Follow
        ));
        assert!(matches!(
            policy.check(StatusCode::FOUND, &next, &urls(4)),
            ActionKind::Error(_)
        ));
    }

    #[test]
    fn none_policy_stops() {
        let policy = Policy::none();
        let next = Url::parse("http://example.com/next").unwrap();
        assert!(matches!(
            policy.check(StatusCode::MOVED_PERMANENTLY, &next, &urls(1)),
            ActionKind::Stop
        ));
    }

    #[test]
    fn custom_policy_sees_the_attempt() {
        let policy = Policy::custom(|attempt| {
            if attempt.url().path() == "/stop-here" {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });
        let stop = Url::parse("http://example.com/stop-here").unwrap();
        let go = Url::parse("http://example.com/go").unwrap();
        assert!(matches!(
            policy.check(StatusCode::FOUND, &stop, &urls(1)),
            ActionKind::Stop
        ));
        assert!(matches!(
            policy.check(StatusCode::FOUND, &go, &urls(1)),
            ActionKind::Follow
        ));
    }
}
