//! Credential Store
//!
//! Persists the authorization record as plain JSON at a fixed path. Writes go
//! through a temporary file and a rename so a crash never leaves a truncated
//! record behind.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::record::AuthorizationRecord;
use crate::common::Error;

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record.
    ///
    /// Absent and unreadable records both yield `None`: either way the caller
    /// has to obtain a fresh authorization.
    pub async fn load(&self) -> Option<AuthorizationRecord> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored authorization");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read stored authorization");
                return None;
            }
        };

        match serde_json::from_str::<AuthorizationRecord>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stored authorization is malformed, ignoring it");
                None
            }
        }
    }

    /// Persist the record, replacing any previous one atomically.
    pub async fn save(&self, record: &AuthorizationRecord) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Storage(format!("Failed to serialize authorization: {}", e)))?;

        let tmp_path = self.tmp_path();
        self.write_tmp(&tmp_path, &json).await.map_err(|e| {
            Error::Storage(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::Storage(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            )));
        }

        debug!(path = %self.path.display(), "Authorization saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_tmp(&self, tmp_path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}
