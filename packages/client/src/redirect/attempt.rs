//! Per-hop redirect decisions.

use std::error::Error as StdError;

use http::StatusCode;
use url::Url;

/// Information about one hop of a redirect chain, handed to the policy.
#[derive(Debug)]
pub struct Attempt<'a> {
    pub(crate) status: StatusCode,
    pub(crate) next: &'a Url,
    pub(crate) previous: &'a [Url],
}

/// What to do with a redirect response.
#[derive(Debug)]
pub struct Action {
    pub(crate) inner: ActionKind,
}

#[derive(Debug)]
pub(crate) enum ActionKind {
    Follow,
    Stop,
    Error(Box<dyn StdError + Send + Sync>),
}

impl<'a> Attempt<'a> {
    /// The redirect status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The URL the redirect points at.
    pub fn url(&self) -> &Url {
        self.next
    }

    /// The URLs already visited in this chain, oldest first.
    pub fn previous(&self) -> &[Url] {
        self.previous
    }

    /// Follow the redirect.
    pub fn follow(self) -> Action {
        Action {
            inner: ActionKind::Follow,
        }
    }

    /// Stop here and return the redirect response itself as success.
    pub fn stop(self) -> Action {
        Action {
            inner: ActionKind::Stop,
        }
    }

    /// Fail the request with an error.
    pub fn error<E: Into<Box<dyn StdError + Send + Sync>>>(self, error: E) -> Action {
        Action {
            inner: ActionKind::Error(error.into()),
        }
    }
}
