//! Google API Authenticated HTTP Client
//!
//! Wraps a shared reqwest client with the bearer token of one credential and
//! maps Google's REST error envelope onto [`Error::Upstream`].

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::auth::Credential;
use crate::common::Error;

/// Google API HTTP client bound to one access token.
pub struct GoogleClient {
    http: Client,
    credential: Credential,
}

impl GoogleClient {
    pub fn new(http: Client, credential: Credential) -> Self {
        Self { http, credential }
    }

    /// Make an authenticated GET request
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value, Error> {
        let builder = self.http.get(url).query(query);
        self.execute_request(builder).await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value, Error> {
        let builder = self.http.post(url).json(body);
        self.execute_request(builder).await
    }

    /// Make an authenticated PUT request with JSON body
    pub async fn put(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, Error> {
        let builder = self.http.put(url).query(query).json(body);
        self.execute_request(builder).await
    }

    /// `<token_type> <access_token>`, with `Bearer` when the token endpoint
    /// gave no type.
    fn authorization(&self) -> String {
        let scheme = match self.credential.token_type.trim() {
            "" => "Bearer",
            scheme => scheme,
        };
        format!("{} {}", scheme, self.credential.access_token)
    }

    async fn execute_request(&self, builder: RequestBuilder) -> Result<Value, Error> {
        let response = builder
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        debug!(%status, url = %response.url(), "Google API response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by Google API");
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to read response body: {}", e)))?;

        if status.is_success() && body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let parsed: Result<Value, _> = serde_json::from_str(&body);

        if !status.is_success() {
            let message = match parsed {
                Ok(ref value) => extract_error_message(value, status),
                Err(_) => format!("HTTP {} error: {}", status, body.trim()),
            };
            error!(%status, "{}", message);
            return Err(Error::Upstream(message));
        }

        parsed.map_err(|e| Error::Upstream(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Google APIs report failures as `{"error": {"code": 400, "message": "..."}}`.
fn extract_error_message(response: &Value, status: StatusCode) -> String {
    if let Some(error_obj) = response.get("error") {
        if let Some(message) = error_obj.get("message").and_then(|v| v.as_str()) {
            let code = error_obj
                .get("code")
                .and_then(|v| v.as_i64())
                .unwrap_or(status.as_u16() as i64);

            return format!("Google API error {}: {}", code, message);
        }
    }

    format!("HTTP {} error", status)
}
