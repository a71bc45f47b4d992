//! Body aggregation with a hard size cap.

use bytes::{Bytes, BytesMut};

use crate::error::{HttpError, Result};
use crate::protocols::H1Connection;

/// Read a response body to completion, failing the moment it exceeds `cap`.
///
/// On overflow the connection is poisoned, never returned to the pool, and
/// the caller sees `ContentTooLarge` rather than a truncated body.
pub(crate) async fn read_capped(conn: &mut H1Connection, cap: usize) -> Result<Bytes> {
    let mut body = BytesMut::new();
    while let Some(chunk) = conn.read_body_chunk().await? {
        if body.len() + chunk.len() > cap {
            conn.poison();
            return Err(HttpError::ContentTooLarge { limit: cap });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Drain and discard a body so the connection can be reused, giving up once
/// `cap` bytes have gone by.
///
/// Returns true when the body was fully consumed. A false return leaves the
/// connection poisoned.
pub(crate) async fn drain_capped(conn: &mut H1Connection, cap: usize) -> Result<bool> {
    let mut seen = 0usize;
    while let Some(chunk) = conn.read_body_chunk().await? {
        seen += chunk.len();
        if seen > cap {
            conn.poison();
            return Ok(false);
        }
    }
    Ok(true)
}
