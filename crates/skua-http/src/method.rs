//! HTTP request methods.

use std::fmt;

/// HTTP request method.
///
/// Only the methods a REST surface actually issues; extension methods are
/// deliberately unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl Method {
    /// Wire token for the request line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether responses to this method carry a body.
    ///
    /// HEAD responses describe a body that is never sent, so the codec must
    /// not wait for one.
    pub const fn expects_response_body(self) -> bool {
        !matches!(self, Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_tokens() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Delete.as_str(), "DELETE");
        assert_eq!(Method::Options.to_string(), "OPTIONS");
    }

    #[test]
    fn test_head_expects_no_body() {
        assert!(!Method::Head.expects_response_body());
        assert!(Method::Get.expects_response_body());
        assert!(Method::Post.expects_response_body());
    }
}
