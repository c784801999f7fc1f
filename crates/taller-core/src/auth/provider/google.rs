//! Google OAuth2 Provider
//!
//! Implements the PKCE Authorization Code flow for installed apps. Client
//! credentials and endpoints come from the operator's client secrets file.

use async_trait::async_trait;
use chrono::SubsecRound;
use tracing::{error, info};

use super::{OAuthProvider, OAuthTokens};
use crate::auth::client_secrets::ClientSecrets;
use crate::common::{create_http_client, Error};

/// Google OAuth2 provider.
#[derive(Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            http: create_http_client()?,
        })
    }

    /// POST a form-encoded request to a token endpoint and parse the answer.
    ///
    /// Secrets travel in the request body, never in the URL.
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<OAuthTokens, Error> {
        let response = self
            .http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| Error::AuthFlow(format!("Token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::AuthFlow(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            error!(%status, "Token endpoint returned an error");
            // Google reports grant errors as JSON; fall back to the raw body.
            return Err(match parse_token_response(&body) {
                Err(e) if body.contains("\"error\"") => e,
                _ => Error::AuthFlow(format!("HTTP {} error: {}", status, body)),
            });
        }

        parse_token_response(&body)
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorize_url(
        &self,
        client: &ClientSecrets,
        scopes: &[String],
        state: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> String {
        let scope_str = scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
            client.auth_uri,
            urlencoding::encode(&client.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(
        &self,
        client: &ClientSecrets,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, Error> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        self.post_form(&client.token_uri, &params).await
    }

    async fn refresh_token(
        &self,
        token_uri: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokens, Error> {
        info!("Refreshing access token");

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        self.post_form(token_uri, &params).await
    }
}

/// Parse a Google OAuth2 token response.
fn parse_token_response(body: &str) -> Result<OAuthTokens, Error> {
    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::AuthFlow(format!("Invalid JSON token response: {}", e)))?;

    if let Some(err) = parsed.get("error").and_then(|v| v.as_str()) {
        let desc = parsed
            .get("error_description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(Error::AuthFlow(format!("{}: {}", err, desc)));
    }

    let access_token = parsed
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::AuthFlow("Missing access_token in response".to_string()))?
        .to_string();

    let refresh_token = parsed
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .map(String::from);

    let token_type = parsed
        .get("token_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Bearer")
        .to_string();

    let expires_in = parsed
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);

    // Stored with microsecond precision, so truncate now to keep round-trips exact.
    let expiry = (chrono::Utc::now() + chrono::Duration::seconds(expires_in)).trunc_subsecs(6);

    let scopes = parsed
        .get("scope")
        .and_then(|v| v.as_str())
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    Ok(OAuthTokens {
        access_token,
        refresh_token,
        token_type,
        expiry,
        scopes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str) -> ClientSecrets {
        ClientSecrets {
            client_id: "cid.apps.googleusercontent.com".to_string(),
            client_secret: "csecret".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: format!("{}/token", server_uri),
        }
    }

    #[test]
    fn test_authorize_url_requests_offline_access() {
        let provider = GoogleProvider::new().unwrap();
        let client = client_for("https://oauth2.googleapis.com");
        let url = provider.authorize_url(
            &client,
            &["https://www.googleapis.com/auth/calendar".to_string()],
            "st",
            "challenge",
            "http://127.0.0.1:4321",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A4321"));
        assert!(url.contains("client_id=cid.apps.googleusercontent.com"));
    }

    #[test]
    fn test_parse_token_response_success() {
        let body = r#"{
            "access_token": "ya29.test",
            "refresh_token": "1//0e.test",
            "token_type": "Bearer",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.send https://www.googleapis.com/auth/calendar"
        }"#;

        let tokens = parse_token_response(body).unwrap();
        assert_eq!(tokens.access_token, "ya29.test");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//0e.test"));
        assert_eq!(tokens.scopes.len(), 2);
        assert!(tokens.expiry > chrono::Utc::now());
    }

    #[test]
    fn test_parse_token_response_error() {
        let body = r#"{"error": "invalid_grant", "error_description": "Token has been revoked"}"#;
        let err = parse_token_response(body).unwrap_err();
        assert!(matches!(err, Error::AuthFlow(ref m) if m.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoogleProvider::new().unwrap();
        let tokens = provider
            .refresh_token(&format!("{}/token", server.uri()), "cid", "secret", "rt-1")
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.fresh");
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_revoked_refresh_grant_is_auth_flow_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let provider = GoogleProvider::new().unwrap();
        let err = provider
            .refresh_token(&format!("{}/token", server.uri()), "cid", "secret", "rt-1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthFlow(ref m) if m.contains("expired or revoked")));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.first",
                "refresh_token": "1//rt",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GoogleProvider::new().unwrap();
        let tokens = provider
            .exchange_code(
                &client_for(&server.uri()),
                "code-1",
                "verifier-1",
                "http://127.0.0.1:1234",
            )
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.first");
        assert_eq!(tokens.token_type, "Bearer");
    }
}
