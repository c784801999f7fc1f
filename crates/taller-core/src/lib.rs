//! Taller core
//!
//! Everything behind the MCP transport: configuration, the credential
//! lifecycle for Google APIs, thin clients for SerpAPI, Gmail, Sheets and
//! Calendar, and the closed registry of tools that exposes them.

pub mod auth;
pub mod common;
pub mod config;
pub mod google;
pub mod search;
pub mod tools;

pub use auth::{Credential, CredentialManager};
pub use common::{Error, ErrorKind};
pub use config::Config;
pub use tools::{Tool, ToolCall, ToolRegistry};
