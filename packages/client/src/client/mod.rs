//! The client engine.

pub(crate) mod aggregate;
mod core;
pub mod stats;

pub use core::HttpClient;
pub use stats::PoolStats;
