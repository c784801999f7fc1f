//! Google API clients
//!
//! Thin wrappers over the Gmail v1, Sheets v4 and Calendar v3 REST APIs. Each
//! is built per invocation from a fresh credential and a base URL.

pub mod calendar_api;
pub mod client;
pub mod common;
pub mod gmail;
pub mod sheets;

pub use calendar_api::CalendarApi;
pub use client::GoogleClient;
pub use gmail::GmailApi;
pub use sheets::SheetsApi;

/// Implements the standard constructor: an authenticated client plus the
/// API's base URL.
macro_rules! google_api_wrapper {
    ($name:ident) => {
        impl $name {
            /// Bind the API to an authenticated client and base URL
            pub fn new(client: crate::google::client::GoogleClient, base_url: &str) -> Self {
                Self {
                    client,
                    base_url: base_url.trim_end_matches('/').to_string(),
                }
            }
        }
    };
}

pub(crate) use google_api_wrapper;
