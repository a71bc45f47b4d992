//! Fluent request building.

mod auth;
mod body;
mod core;
mod headers;
mod methods;

pub use core::RequestBuilder;
