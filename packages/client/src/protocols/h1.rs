//! HTTP/1.1 connection codec.
//!
//! One [`H1Connection`] owns one transport and serializes exactly one
//! exchange at a time: write the request head and body, read the response
//! head, then drain the body chunk by chunk. Framing state lives in
//! [`BodyState`] so a connection can only go back to the pool once the body
//! it was reading is fully consumed.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use crate::config::BufferPool;
use crate::connect::Transport;
use crate::error::{HttpError, Result};

/// Hard cap on the size of a response head. A peer that sends more header
/// bytes than this without terminating the head is broken or hostile.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Status line and headers of a response, before any body bytes.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// Request body length as declared on the wire.
pub(crate) enum BodyLen {
    Empty,
    Known(u64),
    Chunked,
}

/// Where the connection is within the current response body.
enum BodyState {
    /// `n` bytes remain of a content-length body.
    ContentLength(u64),
    /// Inside a chunked body.
    Chunked(ChunkPhase),
    /// Body runs until the peer closes the connection.
    UntilClose,
    /// Body fully consumed (or there never was one).
    Done,
}

enum ChunkPhase {
    /// Expecting a `size[;ext]\r\n` line.
    SizeLine,
    /// `n` data bytes remain in the current chunk.
    Data(u64),
    /// Expecting the `\r\n` that terminates a chunk's data.
    DataEnd,
    /// Past the last chunk, consuming trailer lines until the blank line.
    Trailers,
}

pub(crate) struct H1Connection {
    io: Transport,
    read_buf: BytesMut,
    buffers: Arc<BufferPool>,
    body: BodyState,
    reusable: bool,
    idle_since: Instant,
}

impl H1Connection {
    pub(crate) fn new(io: Transport, buffers: Arc<BufferPool>) -> Self {
        Self {
            io,
            read_buf: buffers.checkout(),
            buffers,
            body: BodyState::Done,
            reusable: true,
            idle_since: Instant::now(),
        }
    }

    /// Whether the connection may serve another exchange. False once the
    /// peer asked for close, framing broke, or a body was abandoned. Bytes
    /// left in the read buffer past the end of the body mean the framing is
    /// desynced, so that connection must be closed too.
    pub(crate) fn is_reusable(&self) -> bool {
        self.reusable && matches!(self.body, BodyState::Done) && self.read_buf.is_empty()
    }

    /// Mark the connection unusable for further exchanges.
    pub(crate) fn poison(&mut self) {
        self.reusable = false;
    }

    pub(crate) fn idle_since(&self) -> Instant {
        self.idle_since
    }

    pub(crate) fn touch(&mut self) {
        self.idle_since = Instant::now();
    }

    /// Cheap liveness probe for a connection coming out of the idle set.
    ///
    /// A healthy idle connection has nothing to read: `try_read` returns
    /// `WouldBlock`. Readable zero bytes means the peer closed; readable
    /// data on an idle connection is a framing leftover, equally fatal.
    pub(crate) fn is_pooled_healthy(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.io.tcp().try_read(&mut probe) {
            Ok(_) => false,
            Err(e) => e.kind() == std::io::ErrorKind::WouldBlock,
        }
    }

    /// Write the request head: status line, host, caller headers, framing.
    pub(crate) async fn write_head(
        &mut self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body_len: &BodyLen,
    ) -> Result<()> {
        let head = encode_head(method, url, headers, body_len)?;
        self.io.write_all(&head).await?;
        Ok(())
    }

    /// Write a complete body and flush.
    pub(crate) async fn write_body(&mut self, body: &[u8]) -> Result<()> {
        if !body.is_empty() {
            self.io.write_all(body).await?;
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Write one chunk of a chunked request body. Empty chunks are skipped
    /// so a caller's empty `Bytes` cannot terminate the body early.
    pub(crate) async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let size_line = format!("{:x}\r\n", chunk.len());
        self.io.write_all(size_line.as_bytes()).await?;
        self.io.write_all(chunk).await?;
        self.io.write_all(b"\r\n").await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Terminate a chunked request body.
    pub(crate) async fn finish_chunked(&mut self) -> Result<()> {
        self.io.write_all(b"0\r\n\r\n").await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read the response head, skipping past interim 1xx responses, and arm
    /// the body state for the exchange.
    pub(crate) async fn read_head(&mut self, head_request: bool) -> Result<ResponseHead> {
        loop {
            let head_end = loop {
                if let Some(end) = find_head_end(&self.read_buf) {
                    break end;
                }
                if self.read_buf.len() > MAX_HEAD_BYTES {
                    self.reusable = false;
                    return Err(HttpError::protocol("response head exceeds 64KB"));
                }
                if self.fill_read_buf().await? == 0 {
                    self.reusable = false;
                    return Err(HttpError::ClosedByPeer);
                }
            };

            let raw = self.read_buf.split_to(head_end);
            let head = parse_head(&raw)?;

            if head.status.is_informational() {
                continue;
            }

            let framing = response_framing(&head, head_request)?;
            self.body = framing.body;
            self.reusable = framing.reusable;
            return Ok(head);
        }
    }

    /// Read the next piece of the response body. `None` means the body is
    /// complete and the connection is back in a clean state.
    pub(crate) async fn read_body_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match &mut self.body {
                BodyState::Done => return Ok(None),
                BodyState::ContentLength(remaining) => {
                    let remaining = *remaining;
                    if remaining == 0 {
                        self.body = BodyState::Done;
                        return Ok(None);
                    }
                    if self.read_buf.is_empty() && self.fill_read_buf().await? == 0 {
                        self.reusable = false;
                        return Err(HttpError::ClosedByPeer);
                    }
                    let take = (self.read_buf.len() as u64).min(remaining) as usize;
                    let left = remaining - take as u64;
                    self.body = if left == 0 {
                        BodyState::Done
                    } else {
                        BodyState::ContentLength(left)
                    };
                    return Ok(Some(self.read_buf.split_to(take).freeze()));
                }
                BodyState::Chunked(_) => {
                    if let Some(result) = self.advance_chunked()? {
                        return Ok(result);
                    }
                    if self.fill_read_buf().await? == 0 {
                        self.reusable = false;
                        return Err(HttpError::ClosedByPeer);
                    }
                }
                BodyState::UntilClose => {
                    if !self.read_buf.is_empty() {
                        let chunk = mem::take(&mut self.read_buf);
                        self.read_buf = self.buffers.checkout();
                        return Ok(Some(chunk.freeze()));
                    }
                    if self.fill_read_buf().await? == 0 {
                        self.body = BodyState::Done;
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Drive the chunked state machine over buffered bytes.
    ///
    /// `Ok(Some(Some(chunk)))` yields data, `Ok(Some(None))` means the body
    /// finished, `Ok(None)` means more input is needed.
    fn advance_chunked(&mut self) -> Result<Option<Option<Bytes>>> {
        loop {
            let phase = match &mut self.body {
                BodyState::Chunked(phase) => phase,
                _ => return Ok(Some(None)),
            };
            match phase {
                ChunkPhase::SizeLine => {
                    let Some(line_end) = find_line_end(&self.read_buf) else {
                        return Ok(None);
                    };
                    let line = self.read_buf.split_to(line_end + 2);
                    let Some(size) = parse_chunk_size(&line[..line_end]) else {
                        self.reusable = false;
                        return Err(HttpError::protocol("malformed chunk size line"));
                    };
                    *phase = if size == 0 {
                        ChunkPhase::Trailers
                    } else {
                        ChunkPhase::Data(size)
                    };
                }
                ChunkPhase::Data(remaining) => {
                    if self.read_buf.is_empty() {
                        return Ok(None);
                    }
                    let take = (self.read_buf.len() as u64).min(*remaining) as usize;
                    *remaining -= take as u64;
                    if *remaining == 0 {
                        *phase = ChunkPhase::DataEnd;
                    }
                    return Ok(Some(Some(self.read_buf.split_to(take).freeze())));
                }
                ChunkPhase::DataEnd => {
                    if self.read_buf.len() < 2 {
                        return Ok(None);
                    }
                    if &self.read_buf[..2] != b"\r\n" {
                        self.reusable = false;
                        return Err(HttpError::protocol("missing CRLF after chunk data"));
                    }
                    self.read_buf.advance(2);
                    *phase = ChunkPhase::SizeLine;
                }
                ChunkPhase::Trailers => {
                    let Some(line_end) = find_line_end(&self.read_buf) else {
                        return Ok(None);
                    };
                    let blank = line_end == 0;
                    self.read_buf.advance(line_end + 2);
                    if blank {
                        self.body = BodyState::Done;
                        return Ok(Some(None));
                    }
                }
            }
        }
    }

    async fn fill_read_buf(&mut self) -> Result<usize> {
        let n = self.io.read_buf(&mut self.read_buf).await?;
        Ok(n)
    }
}

impl Drop for H1Connection {
    fn drop(&mut self) {
        self.buffers.checkin(mem::take(&mut self.read_buf));
    }
}

/// Serialize a request head. Host and framing headers come from the client,
/// so caller-supplied copies of those are dropped.
fn encode_head(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body_len: &BodyLen,
) -> Result<Vec<u8>> {
    let host = url
        .host_str()
        .ok_or_else(|| HttpError::invalid_request("url has no host"))?;
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(target.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\nhost: ");
    match url.port() {
        Some(port) => head.extend_from_slice(format!("{host}:{port}").as_bytes()),
        None => head.extend_from_slice(host.as_bytes()),
    }
    head.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        if name == HOST || name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    match body_len {
        BodyLen::Empty => {}
        BodyLen::Known(n) => {
            head.extend_from_slice(format!("content-length: {n}\r\n").as_bytes());
        }
        BodyLen::Chunked => {
            head.extend_from_slice(b"transfer-encoding: chunked\r\n");
        }
    }
    head.extend_from_slice(b"\r\n");
    Ok(head)
}

/// Find the index one past the `\r\n\r\n` terminating the head, if buffered.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Index of the `\r` of the next `\r\n`, if buffered.
fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Option<u64> {
    // Chunk extensions after `;` are tolerated and ignored.
    let size_part = match line.iter().position(|&b| b == b';') {
        Some(i) => &line[..i],
        None => line,
    };
    let text = std::str::from_utf8(size_part).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    u64::from_str_radix(text, 16).ok()
}

/// Parse a buffered response head (including its terminating blank line).
fn parse_head(raw: &[u8]) -> Result<ResponseHead> {
    let mut lines = raw.split(|&b| b == b'\n').map(|l| l.strip_suffix(b"\r").unwrap_or(l));

    let status_line = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| HttpError::protocol("empty response head"))?;
    let status_line = std::str::from_utf8(status_line)
        .map_err(|_| HttpError::protocol("status line is not valid UTF-8"))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = match parts.next() {
        Some("HTTP/1.1") => Version::HTTP_11,
        Some("HTTP/1.0") => Version::HTTP_10,
        other => {
            return Err(HttpError::protocol(format!(
                "unsupported HTTP version `{}`",
                other.unwrap_or("")
            )));
        }
    };
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| HttpError::protocol("malformed status code"))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| HttpError::protocol("header line missing colon"))?;
        let name = HeaderName::from_bytes(line[..colon].trim_ascii())
            .map_err(|_| HttpError::protocol("invalid header name"))?;
        let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii())
            .map_err(|_| HttpError::protocol("invalid header value"))?;
        headers.append(name, value);
    }

    Ok(ResponseHead {
        status,
        version,
        headers,
    })
}

struct Framing {
    body: BodyState,
    reusable: bool,
}

/// Decide body framing and keep-alive for a parsed head, per RFC 9112 §6.
fn response_framing(head: &ResponseHead, head_request: bool) -> Result<Framing> {
    let connection = head
        .headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mut reusable = match head.version {
        Version::HTTP_11 => !connection.eq_ignore_ascii_case("close"),
        _ => connection.eq_ignore_ascii_case("keep-alive"),
    };

    let bodyless = head_request
        || head.status == StatusCode::NO_CONTENT
        || head.status == StatusCode::NOT_MODIFIED;
    if bodyless {
        return Ok(Framing {
            body: BodyState::Done,
            reusable,
        });
    }

    let chunked = head
        .headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
        });
    if chunked {
        return Ok(Framing {
            body: BodyState::Chunked(ChunkPhase::SizeLine),
            reusable,
        });
    }

    let mut lengths = head.headers.get_all(CONTENT_LENGTH).iter();
    if let Some(first) = lengths.next() {
        if lengths.any(|other| other != first) {
            return Err(HttpError::protocol("conflicting content-length headers"));
        }
        let n: u64 = first
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| HttpError::protocol("malformed content-length"))?;
        let body = if n == 0 {
            BodyState::Done
        } else {
            BodyState::ContentLength(n)
        };
        return Ok(Framing { body, reusable });
    }

    // No framing header at all: body runs to EOF and the connection dies
    // with it.
    reusable = false;
    Ok(Framing {
        body: BodyState::UntilClose,
        reusable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(raw: &str) -> ResponseHead {
        parse_head(raw.as_bytes()).unwrap()
    }

    #[test]
    fn parses_status_line_and_headers() {
        let h = head("HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 3\r\n\r\n");
        assert_eq!(h.status, StatusCode::OK);
        assert_eq!(h.version, Version::HTTP_11);
        assert_eq!(h.headers.get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn rejects_malformed_status() {
        assert!(parse_head(b"HTTP/1.1 banana OK\r\n\r\n").is_err());
        assert!(parse_head(b"SPDY/3 200 OK\r\n\r\n").is_err());
    }

    #[test]
    fn framing_prefers_chunked_over_content_length() {
        let h = head(
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\ncontent-length: 10\r\n\r\n",
        );
        let f = response_framing(&h, false).unwrap();
        assert!(matches!(f.body, BodyState::Chunked(ChunkPhase::SizeLine)));
    }

    #[test]
    fn framing_conflicting_content_lengths_are_fatal() {
        let h = head("HTTP/1.1 200 OK\r\ncontent-length: 10\r\ncontent-length: 20\r\n\r\n");
        assert!(response_framing(&h, false).is_err());
    }

    #[test]
    fn framing_head_and_no_content_have_no_body() {
        let h = head("HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\n");
        let f = response_framing(&h, true).unwrap();
        assert!(matches!(f.body, BodyState::Done));

        let h = head("HTTP/1.1 204 No Content\r\n\r\n");
        let f = response_framing(&h, false).unwrap();
        assert!(matches!(f.body, BodyState::Done));
        assert!(f.reusable);
    }

    #[test]
    fn framing_missing_length_reads_until_close() {
        let h = head("HTTP/1.1 200 OK\r\n\r\n");
        let f = response_framing(&h, false).unwrap();
        assert!(matches!(f.body, BodyState::UntilClose));
        assert!(!f.reusable);
    }

    #[test]
    fn framing_http10_defaults_to_close() {
        let h = head("HTTP/1.0 200 OK\r\ncontent-length: 0\r\n\r\n");
        let f = response_framing(&h, false).unwrap();
        assert!(!f.reusable);

        let h = head("HTTP/1.0 200 OK\r\nconnection: keep-alive\r\ncontent-length: 0\r\n\r\n");
        let f = response_framing(&h, false).unwrap();
        assert!(f.reusable);
    }

    #[test]
    fn chunk_size_lines_parse_hex_and_extensions() {
        assert_eq!(parse_chunk_size(b"1a"), Some(26));
        assert_eq!(parse_chunk_size(b"A"), Some(10));
        assert_eq!(parse_chunk_size(b"5;ext=1"), Some(5));
        assert_eq!(parse_chunk_size(b"0"), Some(0));
        assert_eq!(parse_chunk_size(b""), None);
        assert_eq!(parse_chunk_size(b"zz"), None);
    }

    #[test]
    fn encode_head_sets_host_and_framing() {
        let url = Url::parse("http://example.com:8080/a/b?q=1").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("*/*"));
        // Caller-supplied framing headers must not leak through.
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        let head = encode_head(&Method::POST, &url, &headers, &BodyLen::Known(3)).unwrap();
        let text = String::from_utf8(head).unwrap();
        assert!(text.starts_with("POST /a/b?q=1 HTTP/1.1\r\n"));
        assert!(text.contains("host: example.com:8080\r\n"));
        assert!(text.contains("accept: */*\r\n"));
        assert!(text.contains("content-length: 3\r\n"));
        assert!(!text.contains("999"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn find_head_end_requires_blank_line() {
        assert_eq!(find_head_end(b"HTTP/1.1 200 OK\r\n"), None);
        assert_eq!(find_head_end(b"HTTP/1.1 200 OK\r\n\r\nbody"), Some(19));
    }
}
