//! Credential lifecycle
//!
//! Every Google-backed tool asks the [`CredentialManager`] for a fresh
//! [`Credential`] before calling out. The manager owns the token file and
//! decides, in order:
//!
//! 1. stored record valid and covering the scope set: use it as is
//! 2. stored record expired but refreshable: refresh, persist, use
//! 3. otherwise: run the interactive consent flow, persist, use
//!
//! Steps 2 and 3 are serialized in-process, and the store is re-read after
//! acquiring the lock so racing callers reuse the winner's record.

pub mod client_secrets;
pub mod flow;
pub mod provider;
pub mod record;
pub mod store;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::common::Error;
use crate::config::Config;
use client_secrets::ClientSecrets;
use flow::PendingAuthorization;
use provider::google::GoogleProvider;
use provider::OAuthProvider;
use record::AuthorizationRecord;
use store::CredentialStore;

/// Scopes every stored authorization must cover.
pub const GOOGLE_SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/calendar",
];

/// A usable access token for one tool invocation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    pub access_token: String,
    #[zeroize(skip)]
    pub token_type: String,
    #[zeroize(skip)]
    pub expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl From<&AuthorizationRecord> for Credential {
    fn from(record: &AuthorizationRecord) -> Self {
        Self {
            access_token: record.token.clone(),
            token_type: "Bearer".to_string(),
            expiry: record.expiry,
        }
    }
}

pub struct CredentialManager {
    store: CredentialStore,
    client_secrets_path: PathBuf,
    provider: Arc<dyn OAuthProvider>,
    scopes: Vec<String>,
    auth_timeout: Option<Duration>,
    open_browser: bool,
    cancel: CancellationToken,
    /// Held across refresh and interactive authorization.
    flight: Mutex<()>,
}

impl CredentialManager {
    pub fn new(config: &Config, provider: Arc<dyn OAuthProvider>) -> Self {
        Self {
            store: CredentialStore::new(config.token_path.clone()),
            client_secrets_path: config.client_secrets_path.clone(),
            provider,
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_timeout: config.auth_timeout,
            open_browser: config.open_browser,
            cancel: CancellationToken::new(),
            flight: Mutex::new(()),
        }
    }

    /// Manager backed by Google's OAuth endpoints.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Ok(Self::new(config, Arc::new(GoogleProvider::new()?)))
    }

    /// Use `cancel` to abort pending interactive authorizations.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Produce a credential valid for the full scope set, refreshing or
    /// re-authorizing as needed.
    pub async fn get_credential(&self) -> Result<Credential, Error> {
        if let Some(credential) = self.usable_stored_credential().await {
            return Ok(credential);
        }

        let _guard = self.flight.lock().await;

        // Another caller may have refreshed or authorized while we waited.
        let record = self.store.load().await;
        if let Some(record) = record {
            if record.is_valid_at(Utc::now()) && record.covers(&self.scopes) {
                debug!("Using authorization obtained by a concurrent request");
                return Ok(Credential::from(&record));
            }

            if record.can_refresh() && record.covers(&self.scopes) {
                match self.refresh(record).await {
                    Ok(credential) => return Ok(credential),
                    Err(e @ Error::Storage(_)) => return Err(e),
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed, falling back to interactive authorization");
                    }
                }
            } else {
                info!("Stored authorization is missing scopes or cannot be refreshed");
            }
        }

        self.authorize_interactively().await
    }

    async fn usable_stored_credential(&self) -> Option<Credential> {
        let record = self.store.load().await?;
        if record.is_valid_at(Utc::now()) && record.covers(&self.scopes) {
            Some(Credential::from(&record))
        } else {
            None
        }
    }

    async fn refresh(&self, mut record: AuthorizationRecord) -> Result<Credential, Error> {
        let refresh_token = record
            .refresh_token
            .clone()
            .ok_or_else(|| Error::AuthFlow("No refresh token stored".to_string()))?;

        let tokens = self
            .provider
            .refresh_token(
                &record.token_uri,
                &record.client_id,
                &record.client_secret,
                &refresh_token,
            )
            .await?;

        record.apply_refresh(tokens);
        self.store.save(&record).await?;
        info!(expiry = ?record.expiry, "Access token refreshed");

        Ok(Credential::from(&record))
    }

    async fn authorize_interactively(&self) -> Result<Credential, Error> {
        let client = ClientSecrets::load(&self.client_secrets_path).await?;

        let pending =
            PendingAuthorization::start(self.provider.as_ref(), &client, &self.scopes).await?;

        info!(url = %pending.auth_url(), "Authorize Google access by opening this URL in a browser");
        if self.open_browser {
            if let Err(e) = open::that_detached(pending.auth_url()) {
                warn!(error = %e, "Could not open a browser, open the URL manually");
            }
        }

        let code = pending.wait_for_code(&self.cancel, self.auth_timeout).await?;

        let tokens = self
            .provider
            .exchange_code(&client, &code.code, &code.code_verifier, &code.redirect_uri)
            .await?;

        let record = AuthorizationRecord::from_tokens(tokens, &client, &self.scopes);
        if !record.can_refresh() {
            warn!("Provider issued no refresh token; the next expiry will require consent again");
        }
        self.store.save(&record).await?;
        info!(path = %self.store.path().display(), "Authorization saved");

        Ok(Credential::from(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::provider::OAuthTokens;
    use super::*;
    use async_trait::async_trait;
    use chrono::SubsecRound;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Provider double that counts grants and records the consent request.
    #[derive(Default)]
    struct MockProvider {
        refresh_calls: AtomicUsize,
        exchange_calls: AtomicUsize,
        fail_refresh: bool,
        consent: std::sync::Mutex<Option<(String, String)>>,
    }

    impl MockProvider {
        fn failing_refresh() -> Self {
            Self {
                fail_refresh: true,
                ..Self::default()
            }
        }

        fn tokens(access: &str, refresh: Option<&str>) -> OAuthTokens {
            OAuthTokens {
                access_token: access.to_string(),
                refresh_token: refresh.map(String::from),
                token_type: "Bearer".to_string(),
                expiry: (Utc::now() + chrono::Duration::hours(1)).trunc_subsecs(6),
                scopes: vec![],
            }
        }
    }

    #[async_trait]
    impl OAuthProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn authorize_url(
            &self,
            _client: &ClientSecrets,
            _scopes: &[String],
            state: &str,
            _code_challenge: &str,
            redirect_uri: &str,
        ) -> String {
            if let Ok(mut consent) = self.consent.lock() {
                *consent = Some((redirect_uri.to_string(), state.to_string()));
            }
            format!("https://consent.invalid/?state={}", state)
        }

        async fn exchange_code(
            &self,
            _client: &ClientSecrets,
            code: &str,
            _code_verifier: &str,
            _redirect_uri: &str,
        ) -> Result<OAuthTokens, Error> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::tokens(&format!("ya29.from-{}", code), Some("1//first")))
        }

        async fn refresh_token(
            &self,
            _token_uri: &str,
            _client_id: &str,
            _client_secret: &str,
            _refresh_token: &str,
        ) -> Result<OAuthTokens, Error> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            // Long enough for concurrent callers to pile up on the lock.
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_refresh {
                return Err(Error::AuthFlow("invalid_grant: Token has been revoked".to_string()));
            }
            Ok(Self::tokens("ya29.refreshed", None))
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        provider: Arc<MockProvider>,
        manager: CredentialManager,
    }

    fn fixture(provider: MockProvider) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            token_path: dir.path().join("token.json"),
            client_secrets_path: dir.path().join("credentials.json"),
            open_browser: false,
            ..Config::default()
        };
        let provider = Arc::new(provider);
        let manager = CredentialManager::new(&config, provider.clone());
        Fixture {
            dir,
            provider,
            manager,
        }
    }

    fn write_record(fixture: &Fixture, token: &str, expires_in: chrono::Duration, scopes: &[&str]) {
        let record = serde_json::json!({
            "token": token,
            "refresh_token": "1//stored",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "cid",
            "client_secret": "cs",
            "scopes": scopes,
            "expiry": (Utc::now() + expires_in).format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        });
        std::fs::write(
            fixture.dir.path().join("token.json"),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();
    }

    fn write_client_secrets(fixture: &Fixture) {
        std::fs::write(
            fixture.dir.path().join("credentials.json"),
            r#"{"installed":{"client_id":"cid","client_secret":"cs"}}"#,
        )
        .unwrap();
    }

    async fn stored(fixture: &Fixture) -> AuthorizationRecord {
        CredentialStore::new(fixture.dir.path().join("token.json"))
            .load()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_record_is_used_without_provider() {
        let f = fixture(MockProvider::default());
        write_record(&f, "ya29.valid", chrono::Duration::hours(1), &GOOGLE_SCOPES);

        let credential = f.manager.get_credential().await.unwrap();

        assert_eq!(credential.access_token, "ya29.valid");
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_record_is_refreshed_and_persisted() {
        let f = fixture(MockProvider::default());
        write_record(&f, "ya29.old", -chrono::Duration::minutes(5), &GOOGLE_SCOPES);
        let before = stored(&f).await.expiry.unwrap();

        let credential = f.manager.get_credential().await.unwrap();

        assert_eq!(credential.access_token, "ya29.refreshed");
        let after = stored(&f).await;
        assert_eq!(after.token, "ya29.refreshed");
        assert!(after.expiry.unwrap() > before);
        assert_eq!(after.refresh_token.as_deref(), Some("1//stored"));
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_refresh_once() {
        let f = fixture(MockProvider::default());
        write_record(&f, "ya29.old", -chrono::Duration::minutes(5), &GOOGLE_SCOPES);

        let (a, b) = tokio::join!(f.manager.get_credential(), f.manager.get_credential());

        assert_eq!(a.unwrap().access_token, "ya29.refreshed");
        assert_eq!(b.unwrap().access_token, "ya29.refreshed");
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_record_and_secrets_is_config_error() {
        let f = fixture(MockProvider::default());

        let err = f.manager.get_credential().await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(!f.dir.path().join("token.json").exists());
        assert_eq!(f.provider.exchange_calls.load(Ordering::SeqCst), 0);
        assert!(f.provider.consent.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_through_to_consent() {
        let f = fixture(MockProvider::failing_refresh());
        write_record(&f, "ya29.old", -chrono::Duration::minutes(5), &GOOGLE_SCOPES);

        let err = f.manager.get_credential().await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_record_missing_scopes_is_not_refreshed() {
        let f = fixture(MockProvider::default());
        write_record(
            &f,
            "ya29.narrow",
            chrono::Duration::hours(1),
            &["https://www.googleapis.com/auth/calendar"],
        );

        let err = f.manager.get_credential().await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(f.provider.refresh_calls.load(Ordering::SeqCst), 0);
    }

    async fn wait_for_consent(provider: &MockProvider) -> (String, String) {
        for _ in 0..200 {
            let consent = provider.consent.lock().unwrap().clone();
            if let Some(consent) = consent {
                return consent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("consent URL was never built");
    }

    #[tokio::test]
    async fn test_interactive_flow_persists_new_record() {
        let f = fixture(MockProvider::default());
        write_client_secrets(&f);
        let provider = f.provider.clone();

        let browser = tokio::spawn(async move {
            let (redirect_uri, state) = wait_for_consent(&provider).await;
            let addr = redirect_uri.trim_start_matches("http://").to_string();
            let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
            let request = format!(
                "GET /?state={}&code=granted HTTP/1.1\r\nHost: {}\r\n\r\n",
                state, addr
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).await.unwrap();
            response
        });

        let credential = f.manager.get_credential().await.unwrap();

        assert!(browser.await.unwrap().starts_with("HTTP/1.1 200 OK"));
        assert_eq!(credential.access_token, "ya29.from-granted");
        let saved = stored(&f).await;
        assert_eq!(saved.refresh_token.as_deref(), Some("1//first"));
        assert_eq!(saved.client_id, "cid");
        assert!(saved.covers(&GOOGLE_SCOPES));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_interactive_flow() {
        let f = fixture(MockProvider::default());
        write_client_secrets(&f);
        let cancel = f.manager.cancellation_token();
        let provider = f.provider.clone();

        tokio::spawn(async move {
            wait_for_consent(&provider).await;
            cancel.cancel();
        });

        let err = f.manager.get_credential().await.unwrap_err();
        assert!(matches!(err, Error::AuthFlow(_)));
        assert!(!f.dir.path().join("token.json").exists());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential {
            access_token: "ya29.secret".to_string(),
            token_type: "Bearer".to_string(),
            expiry: None,
        };
        assert!(!format!("{:?}", credential).contains("ya29"));
    }
}
