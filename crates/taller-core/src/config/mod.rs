//! Configuration management
//!
//! Process configuration is read once from the environment at startup.
//! Everything not overridable here is a fixed constant.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

/// Persisted authorization record, relative to the working directory.
pub const TOKEN_PATH: &str = "token.json";

/// Default OAuth client secrets file, relative to the working directory.
pub const DEFAULT_CLIENT_SECRETS_PATH: &str = "credentials.json";

/// Optional `KEY=value` file consulted for variables the environment lacks.
pub const ENV_FILE_PATH: &str = ".env";

/// Timezone applied to created calendar events when the caller gives none.
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

pub const ENV_SERPAPI_KEY: &str = "SERPAPI_KEY";
pub const ENV_CLIENT_SECRETS: &str = "GOOGLE_CLIENT_SECRETS";
pub const ENV_AUTH_TIMEOUT: &str = "TALLER_AUTH_TIMEOUT_SECS";
pub const ENV_NO_BROWSER: &str = "TALLER_NO_BROWSER";

/// Base URLs of the external APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub serpapi: String,
    pub gmail: String,
    pub sheets: String,
    pub calendar: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            serpapi: "https://serpapi.com".to_string(),
            gmail: "https://gmail.googleapis.com/gmail/v1".to_string(),
            sheets: "https://sheets.googleapis.com/v4".to_string(),
            calendar: "https://www.googleapis.com/calendar/v3".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every API at one base URL (a local mock server in tests).
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            serpapi: base.to_string(),
            gmail: format!("{}/gmail/v1", base),
            sheets: format!("{}/v4", base),
            calendar: format!("{}/calendar/v3", base),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SerpAPI key; `web_search` fails with a config error when unset.
    pub serpapi_key: Option<String>,
    /// OAuth installed-app client descriptor supplied by the operator.
    pub client_secrets_path: PathBuf,
    /// Where the authorization record lives.
    pub token_path: PathBuf,
    /// Upper bound on waiting for the consent redirect. `None` waits forever.
    pub auth_timeout: Option<Duration>,
    /// Launch the system browser for consent (the URL is always logged).
    pub open_browser: bool,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serpapi_key: None,
            client_secrets_path: PathBuf::from(DEFAULT_CLIENT_SECRETS_PATH),
            token_path: PathBuf::from(TOKEN_PATH),
            auth_timeout: None,
            open_browser: true,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Read configuration from the process environment, falling back to
    /// `.env` in the working directory. The environment wins on conflicts.
    pub fn from_env() -> Self {
        Self::from_env_and_file(|key| std::env::var(key).ok(), Path::new(ENV_FILE_PATH))
    }

    fn from_env_and_file<F>(env: F, path: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = read_env_file(path);
        Self::from_lookup(|key| env(key).or_else(|| file.get(key).cloned()))
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let auth_timeout = non_empty(ENV_AUTH_TIMEOUT).and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_AUTH_TIMEOUT);
                None
            }
        });

        Self {
            serpapi_key: non_empty(ENV_SERPAPI_KEY),
            client_secrets_path: non_empty(ENV_CLIENT_SECRETS)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_SECRETS_PATH)),
            auth_timeout,
            open_browser: non_empty(ENV_NO_BROWSER).is_none(),
            ..Self::default()
        }
    }
}

/// Entries of a dotenv-style file. A missing file is empty.
fn read_env_file(path: &Path) -> HashMap<String, String> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable environment file");
            return HashMap::new();
        }
    };

    let vars: HashMap<String, String> = entries
        .filter_map(|entry| match entry {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed environment file line");
                None
            }
        })
        .collect();
    debug!(path = %path.display(), count = vars.len(), "Loaded environment file");
    vars
}
