//! URL parsing and base-URL resolution.
//!
//! Deliberately minimal: skua only speaks absolute `http://` and `https://`
//! URLs, and the only composition it performs is joining a configured base
//! URL with a request path. Anything fancier (userinfo, fragments, percent
//! normalization) is out of scope for a REST client core.

use crate::error::{Error, Result};

/// Components of an absolute HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Scheme was `https`.
    pub https: bool,
    /// Host, as written (case preserved; `Endpoint` lowercases it).
    pub host: String,
    /// Port, defaulted by scheme when absent.
    pub port: String,
    /// Path and query, always starting with `/`.
    pub target: String,
}

/// Whether `s` is an absolute URL with an http(s) scheme.
pub fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Join a base URL and a URI.
///
/// Absolute URIs pass through untouched. Relative URIs require a non-empty
/// absolute base; trailing slashes on the base and a missing leading slash
/// on the URI are normalized so exactly one slash separates them.
pub fn combine_base_and_uri(base_url: &str, uri_or_url: &str) -> Result<String> {
    if is_absolute_url(uri_or_url) {
        return Ok(uri_or_url.to_string());
    }

    if base_url.is_empty() {
        return Err(Error::invalid_url(
            "relative URI provided but base_url is empty",
        ));
    }
    if !is_absolute_url(base_url) {
        return Err(Error::invalid_url(
            "base_url must start with http:// or https://",
        ));
    }

    let base = base_url.trim_end_matches('/');

    if uri_or_url.is_empty() {
        return Ok(format!("{base}/"));
    }
    if uri_or_url.starts_with('/') {
        Ok(format!("{base}{uri_or_url}"))
    } else {
        Ok(format!("{base}/{uri_or_url}"))
    }
}

/// Parse an absolute http(s) URL into its components.
///
/// The port defaults to `443`/`80` by scheme; the target defaults to `/`.
pub fn parse_url(url: &str) -> Result<ParsedUrl> {
    let (https, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(Error::invalid_url(
            "URL must start with http:// or https://",
        ));
    };

    let (hostport, target) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };

    if hostport.is_empty() {
        return Err(Error::invalid_url("URL missing host"));
    }

    // Last ':' splits host from port, so IPv6 literals are unsupported.
    let (host, port) = match hostport.rfind(':') {
        Some(colon) => {
            let port = &hostport[colon + 1..];
            if port.is_empty() {
                return Err(Error::invalid_url("URL has empty port"));
            }
            if !port.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::invalid_url("URL has non-numeric port"));
            }
            (&hostport[..colon], port.to_string())
        }
        None => (hostport, if https { "443" } else { "80" }.to_string()),
    };

    if host.is_empty() {
        return Err(Error::invalid_url("URL has empty host"));
    }

    Ok(ParsedUrl {
        https,
        host: host.to_string(),
        port,
        target: if target.is_empty() {
            "/".to_string()
        } else {
            target.to_string()
        },
    })
}
