//! Request and response model.

pub mod into_url;
pub mod request;
pub mod response;

pub use into_url::IntoUrl;
pub use request::{RequestBody, RequestSpec};
pub use response::ReceivedResponse;
