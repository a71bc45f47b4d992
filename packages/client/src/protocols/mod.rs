//! Wire protocol implementations.

pub(crate) mod h1;

pub(crate) use h1::{BodyLen, H1Connection, ResponseHead};
