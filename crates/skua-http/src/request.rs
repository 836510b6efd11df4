//! Request types.
//!
//! [`Request`] is what callers build; [`PreparedRequest`] is the resolved,
//! endpoint-addressed form the transport layer writes to a socket. Preparing
//! a request is pure: URL resolution and header assembly happen up front so
//! the connection only ever performs I/O.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::method::Method;
use crate::url::{combine_base_and_uri, parse_url};

/// A user-facing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Absolute URL, or a path resolved against a base URL at prepare time.
    pub url: String,
    /// Caller headers; override any automatic header with the same name.
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A request resolved to a concrete endpoint and ready to serialize.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    endpoint: Endpoint,
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl PreparedRequest {
    /// Resolve a [`Request`] against an optional base URL.
    ///
    /// Automatic headers are `Host` (the port is omitted when it is the
    /// scheme default), `User-Agent`, and `Content-Length` when a body is
    /// present. Caller headers replace automatic ones case-insensitively.
    pub fn prepare(request: &Request, base_url: Option<&str>, user_agent: &str) -> Result<Self> {
        let absolute = combine_base_and_uri(base_url.unwrap_or(""), &request.url)?;
        let url = parse_url(&absolute)?;
        let endpoint = Endpoint::from(&url);

        let body = request.body.clone().unwrap_or_else(Bytes::new);

        let host_value = if endpoint.is_default_port() {
            endpoint.host.clone()
        } else {
            endpoint.authority()
        };

        let mut headers: Vec<(String, String)> =
            Vec::with_capacity(request.headers.len() + 3);
        headers.push(("Host".to_string(), host_value));
        headers.push(("User-Agent".to_string(), user_agent.to_string()));
        if request.body.is_some() {
            headers.push(("Content-Length".to_string(), body.len().to_string()));
        }

        for (name, value) in &request.headers {
            set_header(&mut headers, name, value);
        }

        Ok(Self {
            endpoint,
            method: request.method,
            target: url.target,
            headers,
            body,
        })
    }

    /// The endpoint this request is addressed to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path and query of the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Final header list in write order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Request body (empty when none was attached).
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Serialize the request line, headers, and body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.target.as_bytes());
        buf.put_slice(b" HTTP/1.1\r\n");
        for (name, value) in &self.headers {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Replace a header case-insensitively, or append it.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    for (existing, existing_value) in headers.iter_mut() {
        if existing.eq_ignore_ascii_case(name) {
            *existing_value = value.to_string();
            return;
        }
    }
    headers.push((name.to_string(), value.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_resolves_endpoint_and_target() {
        let req = Request::new(Method::Get, "https://API.Example.com/v1/items?limit=5");
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();

        assert_eq!(prepared.endpoint().host, "api.example.com");
        assert_eq!(prepared.endpoint().port, "443");
        assert!(prepared.endpoint().tls);
        assert_eq!(prepared.target(), "/v1/items?limit=5");
    }

    #[test]
    fn test_prepare_against_base_url() {
        let req = Request::new(Method::Post, "items").with_body(&b"{}"[..]);
        let prepared =
            PreparedRequest::prepare(&req, Some("http://localhost:8080/api/"), "skua-test")
                .unwrap();

        assert_eq!(prepared.endpoint().authority(), "localhost:8080");
        assert_eq!(prepared.target(), "/api/items");
    }

    #[test]
    fn test_host_header_omits_default_port() {
        let req = Request::new(Method::Get, "http://example.com/");
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();
        let host = prepared
            .headers()
            .iter()
            .find(|(n, _)| n == "Host")
            .map(|(_, v)| v.as_str());
        assert_eq!(host, Some("example.com"));

        let req = Request::new(Method::Get, "http://example.com:8080/");
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();
        let host = prepared
            .headers()
            .iter()
            .find(|(n, _)| n == "Host")
            .map(|(_, v)| v.as_str());
        assert_eq!(host, Some("example.com:8080"));
    }

    #[test]
    fn test_caller_headers_override_automatic() {
        let req = Request::new(Method::Get, "http://example.com/")
            .with_header("user-agent", "custom/1.0");
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();

        let agents: Vec<_> = prepared
            .headers()
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("user-agent"))
            .collect();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].1, "custom/1.0");
    }

    #[test]
    fn test_content_length_tracks_body() {
        let req = Request::new(Method::Put, "http://example.com/x").with_body(&b"hello"[..]);
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();
        let len = prepared
            .headers()
            .iter()
            .find(|(n, _)| n == "Content-Length")
            .map(|(_, v)| v.as_str());
        assert_eq!(len, Some("5"));
    }

    #[test]
    fn test_encode_wire_format() {
        let req = Request::new(Method::Get, "http://example.com/ping");
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();
        let wire = prepared.encode();
        let text = std::str::from_utf8(&wire).unwrap();

        assert!(text.starts_with("GET /ping HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("User-Agent: skua-test\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
