//! Authorization Record
//!
//! The persisted token bundle, kept in Google's "authorized_user" JSON shape
//! so a token written by Google's reference tooling loads here and vice
//! versa.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::client_secrets::ClientSecrets;
use super::provider::OAuthTokens;

/// Tokens this close to expiry are treated as already expired.
pub const EXPIRY_SKEW_SECS: i64 = 60;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AuthorizationRecord {
    /// Access token
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    #[zeroize(skip)]
    pub token_uri: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub universe_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub account: Option<String>,
    #[serde(default, with = "expiry_format", skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub expiry: Option<DateTime<Utc>>,
    /// Issuer metadata this crate does not interpret, preserved on save.
    #[serde(flatten)]
    #[zeroize(skip)]
    pub extra: Map<String, Value>,
}

// Custom Debug implementation that redacts sensitive fields
impl fmt::Debug for AuthorizationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRecord")
            .field("token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl AuthorizationRecord {
    /// Build a fresh record from a completed authorization code exchange.
    pub fn from_tokens(tokens: OAuthTokens, client: &ClientSecrets, requested_scopes: &[String]) -> Self {
        let scopes = if tokens.scopes.is_empty() {
            requested_scopes.to_vec()
        } else {
            tokens.scopes.clone()
        };

        Self {
            token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes,
            universe_domain: Some("googleapis.com".to_string()),
            account: Some(String::new()),
            expiry: Some(tokens.expiry),
            extra: Map::new(),
        }
    }

    /// Replace token values and expiry after a refresh. The refresh token is
    /// only replaced when the provider rotated it.
    pub fn apply_refresh(&mut self, tokens: OAuthTokens) {
        self.token = tokens.access_token.clone();
        if let Some(rt) = tokens.refresh_token.clone() {
            self.refresh_token = Some(rt);
        }
        self.expiry = Some(tokens.expiry);
    }

    /// Expiry within the skew margin counts as expired. A record without an
    /// expiry never expires on its own.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && !self.is_expired_at(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|rt| !rt.is_empty())
    }

    /// Whether every required scope was granted.
    pub fn covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope.as_ref()))
    }
}

/// Google writes expiry as naive UTC with microseconds and a trailing `Z`,
/// e.g. `2026-10-18T12:00:00.000000Z`.
mod expiry_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}
