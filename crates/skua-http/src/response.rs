//! Response type.

use bytes::Bytes;

/// A complete HTTP response.
///
/// Header names preserve the casing and order the peer sent; lookup is
/// case-insensitive and returns the first match.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Response headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Response body (empty for bodiless responses).
    pub body: Bytes,
}

impl Response {
    /// First header value with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the connection may be reused after this response.
    ///
    /// HTTP/1.1 defaults to keep-alive; a `Connection: close` token opts
    /// out.
    pub fn keep_alive(&self) -> bool {
        self.header("connection")
            .map(|v| !v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
            .unwrap_or(true)
    }

    /// Body as UTF-8, lossily converted.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
