//! # skua-http
//!
//! Wire-level building blocks for the [skua](https://github.com/skua-rs/skua)
//! REST client: HTTP methods, URL parsing, endpoint identity, request and
//! response types, and an incremental HTTP/1.1 codec.
//!
//! This crate is transport-agnostic. It knows how to turn a [`Request`] into
//! bytes and bytes back into a [`Response`], but never touches a socket;
//! that is `skua-client`'s job.
//!
//! ## Quick Start
//!
//! ```rust
//! use skua_http::{Method, Request, PreparedRequest};
//!
//! let req = Request::new(Method::Get, "http://example.com/users/1");
//! let prepared = PreparedRequest::prepare(&req, None, "skua/0.3").unwrap();
//!
//! assert_eq!(prepared.endpoint().host, "example.com");
//! assert_eq!(prepared.target(), "/users/1");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod method;
pub mod request;
pub mod response;
pub mod url;

pub use codec::{BodyFraming, ChunkedDecoder, ResponseHead, Version, MAX_HEAD_BYTES};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use method::Method;
pub use request::{PreparedRequest, Request};
pub use response::Response;
pub use url::{combine_base_and_uri, parse_url, ParsedUrl};
