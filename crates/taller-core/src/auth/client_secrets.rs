//! OAuth client secrets
//!
//! The installed-app client descriptor downloaded from Google Cloud Console
//! and supplied out-of-band by the operator.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::common::Error;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ClientSecrets {
    #[zeroize(skip)]
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    #[zeroize(skip)]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    #[zeroize(skip)]
    pub token_uri: String,
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// File layout: the descriptor sits under `installed` (desktop clients) or
/// `web` (web clients).
#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ClientSecrets {
    /// Read and parse the descriptor. A missing or malformed file is a
    /// configuration error: only the operator can fix it.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Config(format!(
                    "OAuth client secrets not found at {}. Download the desktop client JSON from Google Cloud Console and point GOOGLE_CLIENT_SECRETS at it.",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read client secrets {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Self::parse(&raw).map_err(|msg| {
            Error::Config(format!("Invalid client secrets {}: {}", path.display(), msg))
        })
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client".to_string())
    }
}
