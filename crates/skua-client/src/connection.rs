//! A single reusable HTTP(S) connection.
//!
//! [`HttpConnection`] owns one transport to one endpoint and carries exactly
//! one request at a time; exclusivity is enforced by the pool's
//! [`Lease`](crate::pool::Lease) being move-only. The connection is created
//! unopened and connects on first use, so pool capacity accounting never
//! waits on network I/O.
//!
//! Failure policy: any transport error closes the connection before the
//! error is returned, which is what the pool's "drop on unhealthy release"
//! rule keys off.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use skua_http::codec::{parse_response_head, BodyFraming, ChunkedDecoder};
use skua_http::{Endpoint, PreparedRequest, Response};

use crate::error::{Error, Result};
use crate::tls::TlsConnector;

// ============================================================================
// Stream Wrapper
// ============================================================================

/// Wrapper for either plaintext or TLS streams.
///
/// The TLS variant is much larger, but boxing it would put an indirection on
/// every I/O call.
#[allow(clippy::large_enum_variant)]
enum ConnStream {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl AsyncRead for ConnStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ConnStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ConnStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ConnStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ConnStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

enum ConnState {
    Unopened,
    Open(ConnStream),
    Closed,
}

/// One reusable HTTP/1.1 transport to one endpoint.
pub struct HttpConnection {
    endpoint: Endpoint,
    tls: Arc<TlsConnector>,
    serial: u64,
    state: ConnState,
    read_buf: BytesMut,
}

impl HttpConnection {
    /// Create an unopened connection.
    ///
    /// `serial` is the creation identity the pool assigns; it is stable for
    /// the connection's lifetime, unlike the per-lease id.
    pub fn new(endpoint: Endpoint, tls: Arc<TlsConnector>, serial: u64) -> Self {
        Self {
            endpoint: endpoint.normalized(),
            tls,
            serial,
            state: ConnState::Unopened,
            read_buf: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Endpoint this connection is tied to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Creation identity assigned by the pool.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Whether the transport is currently established.
    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnState::Open(_))
    }

    /// Best-effort usability check.
    ///
    /// Unopened connections are healthy (they have observed no failure and
    /// will connect on first use); a connection transitions to unhealthy
    /// when a transport error or an explicit [`close`](Self::close) parks it
    /// at `Closed`.
    pub fn is_healthy(&self) -> bool {
        !matches!(self.state, ConnState::Closed)
    }

    /// Close the transport. Idempotent, never fails.
    pub fn close(&mut self) {
        self.state = ConnState::Closed;
        self.read_buf.clear();
    }

    /// Establish the transport: DNS + TCP connect, plus a TLS handshake with
    /// SNI when the endpoint requires it. No-op when already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let port: u16 = self
            .endpoint
            .port
            .parse()
            .map_err(|_| Error::ConnectionFailed(format!("invalid port: {}", self.endpoint.port)))?;

        debug!(endpoint = %self.endpoint, "opening connection");
        let tcp = TcpStream::connect((self.endpoint.host.as_str(), port))
            .await
            .map_err(|e| {
                Error::ConnectionFailed(format!("{}: {e}", self.endpoint.authority()))
            })?;

        let stream = if self.endpoint.tls {
            let tls_stream = self.tls.connect(tcp, &self.endpoint.host).await?;
            ConnStream::Tls(tls_stream)
        } else {
            ConnStream::Plain(tcp)
        };

        self.state = ConnState::Open(stream);
        Ok(())
    }

    /// Perform one HTTP transaction.
    ///
    /// Opens lazily on first use. On any transport failure the connection is
    /// closed before the error is returned.
    pub async fn request(&mut self, prepared: &PreparedRequest) -> Result<Response> {
        if prepared.endpoint() != &self.endpoint {
            return Err(Error::InvalidUrl(
                "prepared request endpoint does not match connection endpoint".to_string(),
            ));
        }

        match self.transact(prepared).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn transact(&mut self, prepared: &PreparedRequest) -> Result<Response> {
        self.open().await?;

        let wire = prepared.encode();
        let ConnState::Open(stream) = &mut self.state else {
            return Err(Error::ConnectionClosed);
        };

        stream
            .write_all(&wire)
            .await
            .map_err(|e| Error::SendFailed(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::SendFailed(e.to_string()))?;

        self.read_buf.clear();
        let head = loop {
            if let Some((head, consumed)) = parse_response_head(&self.read_buf)? {
                self.read_buf.advance(consumed);
                break head;
            }
            let n = stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| Error::ReceiveFailed(e.to_string()))?;
            if n == 0 {
                return Err(Error::ReceiveFailed(
                    "connection closed before response head".to_string(),
                ));
            }
        };

        let framing = BodyFraming::resolve(&head, prepared.method())?;
        let mut body = BytesMut::new();
        let mut closed_by_body = false;

        match framing {
            BodyFraming::None => {}
            BodyFraming::Length(len) => {
                while self.read_buf.len() < len {
                    let n = stream
                        .read_buf(&mut self.read_buf)
                        .await
                        .map_err(|e| Error::ReceiveFailed(e.to_string()))?;
                    if n == 0 {
                        return Err(Error::ReceiveFailed(
                            "connection closed mid-body".to_string(),
                        ));
                    }
                }
                body = self.read_buf.split_to(len);
            }
            BodyFraming::Chunked => {
                let mut decoder = ChunkedDecoder::new();
                while !decoder.decode(&mut self.read_buf, &mut body)? {
                    let n = stream
                        .read_buf(&mut self.read_buf)
                        .await
                        .map_err(|e| Error::ReceiveFailed(e.to_string()))?;
                    if n == 0 {
                        return Err(Error::ReceiveFailed(
                            "connection closed mid-chunk".to_string(),
                        ));
                    }
                }
            }
            BodyFraming::UntilClose => {
                loop {
                    let n = stream
                        .read_buf(&mut self.read_buf)
                        .await
                        .map_err(|e| Error::ReceiveFailed(e.to_string()))?;
                    if n == 0 {
                        break;
                    }
                }
                body = std::mem::take(&mut self.read_buf);
                closed_by_body = true;
            }
        }

        if closed_by_body || !head.keep_alive() {
            self.close();
        }

        Ok(Response {
            status: head.status,
            headers: head.headers,
            body: body.freeze(),
        })
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            ConnState::Unopened => "unopened",
            ConnState::Open(ConnStream::Plain(_)) => "open_http",
            ConnState::Open(ConnStream::Tls(_)) => "open_https",
            ConnState::Closed => "closed",
        };
        f.debug_struct("HttpConnection")
            .field("endpoint", &self.endpoint)
            .field("serial", &self.serial)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::TlsClientConfig;
    use skua_http::{Method, Request};
    use tokio::net::TcpListener;

    fn test_tls() -> Arc<TlsConnector> {
        Arc::new(TlsConnector::new(&TlsClientConfig::default()).unwrap())
    }

    #[test]
    fn test_new_connection_is_unopened_and_healthy() {
        let conn = HttpConnection::new(Endpoint::new("localhost", "80", false), test_tls(), 7);
        assert!(!conn.is_open());
        assert!(conn.is_healthy());
        assert_eq!(conn.serial(), 7);
    }

    #[test]
    fn test_close_is_idempotent_and_unhealthy() {
        let mut conn = HttpConnection::new(Endpoint::new("localhost", "80", false), test_tls(), 1);
        conn.close();
        conn.close();
        assert!(!conn.is_healthy());
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_request_rejects_endpoint_mismatch() {
        let mut conn =
            HttpConnection::new(Endpoint::new("localhost", "80", false), test_tls(), 1);
        let req = Request::new(Method::Get, "http://otherhost/");
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();

        let err = conn.request(&prepared).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_request_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            assert!(std::str::from_utf8(&buf[..n]).unwrap().starts_with("GET /ping"));
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong")
                .await
                .unwrap();
        });

        let endpoint = Endpoint::new("127.0.0.1", addr.port().to_string(), false);
        let mut conn = HttpConnection::new(endpoint, test_tls(), 1);

        let req = Request::new(Method::Get, format!("http://127.0.0.1:{}/ping", addr.port()));
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();

        let response = conn.request(&prepared).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"pong");
        assert!(conn.is_open());
        assert!(conn.is_healthy());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            // Hang up without a response head.
        });

        let endpoint = Endpoint::new("127.0.0.1", addr.port().to_string(), false);
        let mut conn = HttpConnection::new(endpoint, test_tls(), 1);

        let req = Request::new(Method::Get, format!("http://127.0.0.1:{}/x", addr.port()));
        let prepared = PreparedRequest::prepare(&req, None, "skua-test").unwrap();

        let err = conn.request(&prepared).await.unwrap_err();
        assert!(matches!(err, Error::ReceiveFailed(_)));
        assert!(!conn.is_healthy());

        server.await.unwrap();
    }
}
