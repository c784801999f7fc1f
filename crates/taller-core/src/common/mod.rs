//! Common Utilities
//!
//! Shared error handling and HTTP client construction.

pub mod error;
pub mod http;

pub use error::{error_codes, Error, ErrorKind};
pub use http::create_http_client;
