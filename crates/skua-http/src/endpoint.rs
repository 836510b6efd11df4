//! Endpoint identity.
//!
//! An [`Endpoint`] is the normalized `(host, port, tls)` triple that selects
//! a connection-pool bucket. Value equality and hashing cover all three
//! fields; once used as a key an endpoint is never mutated.

use std::fmt;

use crate::url::ParsedUrl;

/// Normalized network identity of an HTTP(S) origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    /// Lower-cased host name or address.
    pub host: String,
    /// Port as a decimal string, defaulted by scheme when empty.
    pub port: String,
    /// Whether connections to this endpoint use TLS.
    pub tls: bool,
}

impl Endpoint {
    /// Create an endpoint and normalize it.
    pub fn new(host: impl Into<String>, port: impl Into<String>, tls: bool) -> Self {
        let mut ep = Self {
            host: host.into(),
            port: port.into(),
            tls,
        };
        ep.normalize();
        ep
    }

    /// Lowercase the host and default the port by scheme.
    ///
    /// An empty host becomes `localhost`.
    pub fn normalize(&mut self) {
        if self.host.is_empty() {
            self.host = "localhost".to_string();
        } else if self.host.bytes().any(|b| b.is_ascii_uppercase()) {
            self.host = self.host.to_ascii_lowercase();
        }
        if self.port.is_empty() {
            self.port = if self.tls { "443" } else { "80" }.to_string();
        }
    }

    /// Normalized copy of this endpoint.
    pub fn normalized(&self) -> Self {
        let mut ep = self.clone();
        ep.normalize();
        ep
    }

    /// `host:port` for Host headers and connect calls.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the port is the default for the scheme.
    pub fn is_default_port(&self) -> bool {
        (self.tls && self.port == "443") || (!self.tls && self.port == "80")
    }
}

impl From<&ParsedUrl> for Endpoint {
    fn from(url: &ParsedUrl) -> Self {
        Endpoint::new(url.host.clone(), url.port.clone(), url.https)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_normalize_defaults_port_by_scheme() {
        let ep = Endpoint::new("Example.COM", "", true);
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.port, "443");

        let ep = Endpoint::new("example.com", "", false);
        assert_eq!(ep.port, "80");
    }

    #[test]
    fn test_normalize_empty_host() {
        let ep = Endpoint::new("", "9000", false);
        assert_eq!(ep.host, "localhost");
        assert_eq!(ep.port, "9000");
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let a = Endpoint::new("h", "80", false);
        let b = Endpoint::new("h", "80", true);
        let c = Endpoint::new("h", "81", false);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, Endpoint::new("H", "80", false));
    }

    #[test]
    fn test_usable_as_map_key() {
        let mut m = HashMap::new();
        m.insert(Endpoint::new("h", "80", false), 1);
        assert_eq!(m.get(&Endpoint::new("H", "", false)), Some(&1));
    }

    #[test]
    fn test_authority_and_default_port() {
        let ep = Endpoint::new("example.com", "", true);
        assert_eq!(ep.authority(), "example.com:443");
        assert!(ep.is_default_port());
        assert!(!Endpoint::new("example.com", "8443", true).is_default_port());
    }
}
