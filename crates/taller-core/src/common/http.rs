//! HTTP Client Utilities
//!
//! Shared HTTP client creation with consistent configuration.

use std::time::Duration;

use super::Error;

/// Create a reqwest HTTP client with standard configuration
///
/// - 30 second request timeout, 10 second connect timeout
/// - Cheap to clone; clones share the connection pool
pub fn create_http_client() -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("taller/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Upstream(format!("Failed to build HTTP client: {}", e)))
}
