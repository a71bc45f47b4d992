//! Redirect handling.
//!
//! By default the client follows redirect chains up to 10 hops. A custom
//! [`Policy`] can stop the chain early, fail it, or apply arbitrary logic per
//! hop. Sensitive headers are stripped when a redirect crosses hosts.

mod attempt;
mod headers;
mod policy;

pub(crate) use attempt::ActionKind;
pub use attempt::{Action, Attempt};
pub(crate) use headers::{make_referer, remove_sensitive_headers};
pub(crate) use policy::TooManyRedirects;
pub use policy::Policy;
