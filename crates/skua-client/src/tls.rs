//! Client-side TLS infrastructure.
//!
//! A thin wrapper around rustls: one [`TlsConnector`] is built per pool and
//! shared by every HTTPS connection it creates. SNI is always the endpoint
//! host. Peer verification uses the platform trust store; the insecure mode
//! exists for test rigs with self-signed certificates and nothing else.

use std::io::{BufReader, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// TLS settings for outbound connections.
#[derive(Debug, Clone)]
pub struct TlsClientConfig {
    /// Verify the server certificate chain and host name.
    pub verify_peer: bool,
    /// Optional PEM file of extra root CAs trusted in addition to the
    /// platform roots. Ignored when `verify_peer` is off.
    pub extra_root_ca: Option<PathBuf>,
}

impl Default for TlsClientConfig {
    fn default() -> Self {
        Self {
            verify_peer: true,
            extra_root_ca: None,
        }
    }
}

/// Shared TLS connector for HTTPS connections.
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Build a connector from configuration.
    ///
    /// With `verify_peer` the platform's native root certificates are
    /// loaded; native roots that fail to parse are skipped rather than
    /// failing the whole store. An `extra_root_ca` file must parse, since
    /// the caller named it explicitly.
    pub fn new(config: &TlsClientConfig) -> Result<Self> {
        let client_config = if config.verify_peer {
            let mut roots = rustls::RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for cert in native.certs {
                let _ = roots.add(cert);
            }
            if let Some(path) = &config.extra_root_ca {
                for cert in load_pem_certs(path)? {
                    roots.add(cert).map_err(|e| {
                        Error::TlsHandshakeFailed(format!(
                            "unusable root CA in {}: {e}",
                            path.display()
                        ))
                    })?;
                }
            }
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
                .with_no_client_auth()
        };

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Handshake over an established stream, with SNI set to `server_name`.
    pub async fn connect<IO>(
        &self,
        stream: IO,
        server_name: &str,
    ) -> Result<tokio_rustls::client::TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let name: ServerName<'static> = server_name
            .to_string()
            .try_into()
            .map_err(|_| Error::TlsHandshakeFailed(format!("invalid server name: {server_name}")))?;

        self.inner
            .connect(name, stream)
            .await
            .map_err(|e| Error::TlsHandshakeFailed(e.to_string()))
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

/// Load every certificate from a PEM file.
fn load_pem_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = std::fs::read(path)?;
    let mut reader = BufReader::new(Cursor::new(data));
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::TlsHandshakeFailed(format!("invalid PEM in {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(Error::TlsHandshakeFailed(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Certificate verifier that accepts anything. Test rigs only.
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_builds_with_defaults() {
        let connector = TlsConnector::new(&TlsClientConfig::default());
        assert!(connector.is_ok());
    }

    #[test]
    fn test_connector_builds_without_verification() {
        let connector = TlsConnector::new(&TlsClientConfig {
            verify_peer: false,
            extra_root_ca: None,
        });
        assert!(connector.is_ok());
    }

    #[test]
    fn test_missing_extra_root_ca_fails() {
        let connector = TlsConnector::new(&TlsClientConfig {
            verify_peer: true,
            extra_root_ca: Some(PathBuf::from("/nonexistent/skua-test-ca.pem")),
        });
        assert!(connector.is_err());
    }

    #[test]
    fn test_garbage_extra_root_ca_fails() {
        let path = std::env::temp_dir().join("skua-tls-test-not-a-cert.pem");
        std::fs::write(&path, b"this is not a certificate").unwrap();

        let result = TlsConnector::new(&TlsClientConfig {
            verify_peer: true,
            extra_root_ca: Some(path.clone()),
        });
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(Error::TlsHandshakeFailed(_))));
    }
}
