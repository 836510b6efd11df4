//! Incremental HTTP/1.1 response codec.
//!
//! The transport layer reads raw bytes into a buffer and calls into this
//! module to make sense of them: first [`parse_response_head`] until the
//! blank line arrives, then [`BodyFraming::resolve`] to decide how the body
//! is delimited, then either a plain length count or a [`ChunkedDecoder`].
//!
//! Every function is pure over its inputs and returns `Ok(None)`-style
//! "need more data" results instead of blocking, so the caller keeps full
//! control of socket reads.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::method::Method;

/// Cap on the response head (status line + headers) in bytes.
///
/// A peer that sends more than this without a blank line is not speaking
/// HTTP in good faith.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// HTTP version of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1
    Http11,
}

/// Parsed status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Protocol version from the status line.
    pub version: Version,
    /// Status code.
    pub status: u16,
    /// Headers in wire order, values trimmed of surrounding whitespace.
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First header value with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the connection may be reused after this response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`;
    /// HTTP/1.0 defaults to close unless `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection");
        match self.version {
            Version::Http11 => !connection_has_token(connection, "close"),
            Version::Http10 => connection_has_token(connection, "keep-alive"),
        }
    }
}

fn connection_has_token(value: Option<&str>, token: &str) -> bool {
    value
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Try to parse a response head from the front of `buf`.
///
/// Returns `Ok(None)` until the terminating blank line has arrived, and
/// `Ok(Some((head, consumed)))` once it has, where `consumed` covers the
/// head including the blank line.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>> {
    let head_end = match find_subsequence(buf, b"\r\n\r\n") {
        Some(pos) => pos,
        None => {
            if buf.len() > MAX_HEAD_BYTES {
                return Err(Error::HeadTooLarge(MAX_HEAD_BYTES));
            }
            return Ok(None);
        }
    };
    if head_end > MAX_HEAD_BYTES {
        return Err(Error::HeadTooLarge(MAX_HEAD_BYTES));
    }

    let head = &buf[..head_end];
    let mut lines = head.split(|&b| b == b'\n').map(|l| strip_cr(l));

    let status_line = lines.next().unwrap_or(b"");
    let (version, status) = parse_status_line(status_line)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            // Obsolete line folding; refuse rather than guess.
            return Err(Error::protocol("folded header line"));
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| Error::protocol("header line without colon"))?;
        let name = &line[..colon];
        if name.is_empty() || name.iter().any(|b| b.is_ascii_whitespace()) {
            return Err(Error::protocol("invalid header name"));
        }
        let value = trim_ows(&line[colon + 1..]);
        headers.push((
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }

    Ok(Some((
        ResponseHead {
            version,
            status,
            headers,
        },
        head_end + 4,
    )))
}

fn parse_status_line(line: &[u8]) -> Result<(Version, u16)> {
    let version = if line.starts_with(b"HTTP/1.1 ") {
        Version::Http11
    } else if line.starts_with(b"HTTP/1.0 ") {
        Version::Http10
    } else {
        return Err(Error::protocol("malformed status line"));
    };

    let rest = &line[9..];
    if rest.len() < 3 || !rest[..3].iter().all(|b| b.is_ascii_digit()) {
        return Err(Error::protocol("malformed status code"));
    }
    if rest.len() > 3 && rest[3] != b' ' {
        return Err(Error::protocol("malformed status code"));
    }
    let status = (rest[0] - b'0') as u16 * 100 + (rest[1] - b'0') as u16 * 10
        + (rest[2] - b'0') as u16;
    Ok((version, status))
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn trim_ows(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// How a response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body follows the head.
    None,
    /// Exactly this many bytes follow.
    Length(usize),
    /// Chunked transfer coding.
    Chunked,
    /// Body runs until the peer closes the connection.
    UntilClose,
}

impl BodyFraming {
    /// Decide the framing for a response to `method`.
    ///
    /// `Transfer-Encoding: chunked` wins over `Content-Length`; any other
    /// transfer coding is rejected. Conflicting `Content-Length` values are
    /// a protocol error, not a guess.
    pub fn resolve(head: &ResponseHead, method: Method) -> Result<Self> {
        if !method.expects_response_body()
            || (100..200).contains(&head.status)
            || head.status == 204
            || head.status == 304
        {
            return Ok(BodyFraming::None);
        }

        if let Some(te) = head.header("transfer-encoding") {
            let last = te
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .last();
            return match last {
                Some(t) if t.eq_ignore_ascii_case("chunked") => Ok(BodyFraming::Chunked),
                _ => Err(Error::protocol("unsupported transfer-encoding")),
            };
        }

        let mut lengths = head
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.as_str());
        if let Some(first) = lengths.next() {
            if lengths.any(|other| other != first) {
                return Err(Error::protocol("conflicting content-length headers"));
            }
            let len: usize = first
                .trim()
                .parse()
                .map_err(|_| Error::protocol("invalid content-length"))?;
            return Ok(BodyFraming::Length(len));
        }

        Ok(BodyFraming::UntilClose)
    }
}

/// Incremental decoder for chunked transfer coding.
///
/// Feed it the raw buffer as bytes arrive; it consumes what it can and
/// appends decoded body bytes to `output`. Trailer headers are consumed and
/// discarded.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(usize),
    DataCrlf,
    Trailers,
    Done,
}

impl ChunkedDecoder {
    /// Decoder positioned before the first chunk-size line.
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
        }
    }

    /// Whether the terminal chunk and trailers have been consumed.
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Consume as much of `input` as possible, appending decoded bytes to
    /// `output`. Returns `true` once the body is complete.
    pub fn decode(&mut self, input: &mut BytesMut, output: &mut BytesMut) -> Result<bool> {
        loop {
            match self.state {
                ChunkState::Size => {
                    let line_end = match find_subsequence(input, b"\r\n") {
                        Some(pos) => pos,
                        None => {
                            if input.len() > 256 {
                                return Err(Error::protocol("oversized chunk-size line"));
                            }
                            return Ok(false);
                        }
                    };
                    let line = input.split_to(line_end + 2);
                    let size = parse_chunk_size(&line[..line_end])?;
                    self.state = if size == 0 {
                        ChunkState::Trailers
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    if input.is_empty() {
                        return Ok(false);
                    }
                    let take = remaining.min(input.len());
                    output.put_slice(&input.split_to(take));
                    if take < remaining {
                        self.state = ChunkState::Data(remaining - take);
                        return Ok(false);
                    }
                    self.state = ChunkState::DataCrlf;
                }
                ChunkState::DataCrlf => {
                    if input.len() < 2 {
                        return Ok(false);
                    }
                    let crlf = input.split_to(2);
                    if &crlf[..] != b"\r\n" {
                        return Err(Error::protocol("chunk data not terminated by CRLF"));
                    }
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailers => {
                    let line_end = match find_subsequence(input, b"\r\n") {
                        Some(pos) => pos,
                        None => return Ok(false),
                    };
                    let line = input.split_to(line_end + 2);
                    if line_end == 0 {
                        self.state = ChunkState::Done;
                        return Ok(true);
                    }
                    // Trailer header; discarded.
                    let _ = line;
                }
                ChunkState::Done => return Ok(true),
            }
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    // Chunk extensions after ';' are ignored.
    let hex = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let hex = trim_ows(hex);
    if hex.is_empty() || hex.len() > 16 {
        return Err(Error::protocol("invalid chunk size"));
    }
    let mut size: usize = 0;
    for &b in hex {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(Error::protocol("invalid chunk size")),
        };
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(digit as usize))
            .ok_or_else(|| Error::protocol("chunk size overflow"))?;
    }
    Ok(size)
}
