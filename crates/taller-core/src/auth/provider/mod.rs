//! OAuth Provider Abstraction
//!
//! The credential manager talks to the identity provider only through this
//! trait, so the token lifecycle can be exercised without a real provider.

pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::client_secrets::ClientSecrets;
use crate::common::Error;

/// Tokens returned from an OAuth token exchange or refresh.
#[derive(Debug, Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expiry: DateTime<Utc>,
    /// Granted scopes, if the provider reported them.
    pub scopes: Vec<String>,
}

/// OAuth provider trait.
///
/// Implementations build the consent URL and perform the two token endpoint
/// grants (authorization code and refresh token). Failures are
/// [`Error::AuthFlow`].
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider name (e.g. "google")
    fn name(&self) -> &str;

    /// Build the authorization URL for the PKCE flow.
    fn authorize_url(
        &self,
        client: &ClientSecrets,
        scopes: &[String],
        state: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        client: &ClientSecrets,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, Error>;

    /// Refresh an access token using a refresh token.
    async fn refresh_token(
        &self,
        token_uri: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokens, Error>;
}
