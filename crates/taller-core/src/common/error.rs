//! Common Error Types
//!
//! One error taxonomy for every tool invocation, with JSON-RPC code mapping.

use serde::Serialize;
use serde_json::{json, Value};

/// Error codes in the JSON-RPC custom range (-32099 to -32000).
pub mod error_codes {
    pub const UPSTREAM: i32 = -32000;
    pub const CONFIG_MISSING: i32 = -32010;
    pub const AUTH_FLOW_FAILED: i32 = -32011;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const STORAGE: i32 = -32603;
}

/// Failure of a single tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operator configuration is missing (API key, client secrets file).
    /// Not retryable until the operator fixes the environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token refresh or interactive authorization failed.
    #[error("authorization failed: {0}")]
    AuthFlow(String),

    /// An external REST API rejected the request.
    #[error("{0}")]
    Upstream(String),

    /// Caller-supplied arguments do not match the tool's schema.
    #[error("invalid arguments: {0}")]
    Validation(String),

    /// The authorization record could not be persisted.
    #[error("credential storage error: {0}")]
    Storage(String),
}

/// Coarse classification, serialized into structured tool failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    AuthFlow,
    Upstream,
    Validation,
    Storage,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::AuthFlow(_) => ErrorKind::AuthFlow,
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Storage(_) => ErrorKind::Storage,
        }
    }

    /// JSON-RPC error code for this failure
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Config => error_codes::CONFIG_MISSING,
            ErrorKind::AuthFlow => error_codes::AUTH_FLOW_FAILED,
            ErrorKind::Upstream => error_codes::UPSTREAM,
            ErrorKind::Validation => error_codes::INVALID_PARAMS,
            ErrorKind::Storage => error_codes::STORAGE,
        }
    }

    /// Structured body returned to the calling agent as the tool result.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_by_kind() {
        assert_eq!(Error::Config("x".into()).code(), -32010);
        assert_eq!(Error::AuthFlow("x".into()).code(), -32011);
        assert_eq!(Error::Upstream("x".into()).code(), -32000);
        assert_eq!(Error::Validation("x".into()).code(), -32602);
    }

    #[test]
    fn test_payload_shape() {
        let payload = Error::Config("SERPAPI_KEY is not set".into()).to_payload();
        assert_eq!(payload["error"]["kind"], "config");
        assert_eq!(payload["error"]["code"], -32010);
        assert!(payload["error"]["message"]
            .as_str()
            .unwrap()
            .contains("SERPAPI_KEY"));
    }

    #[test]
    fn test_upstream_message_passes_through() {
        let err = Error::Upstream("Google API error 400: Unable to parse range".into());
        assert_eq!(err.to_string(), "Google API error 400: Unable to parse range");
    }
}
