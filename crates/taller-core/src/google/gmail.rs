//! Gmail API v1 Client

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::extract_array;
use crate::common::Error;

pub struct GmailApi {
    client: GoogleClient,
    base_url: String,
}

super::google_api_wrapper!(GmailApi);

impl GmailApi {
    /// Send a plain-text email from the authenticated account.
    ///
    /// Returns the id Gmail assigned to the sent message.
    pub async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String, Error> {
        info!(%to, "Sending Gmail message");

        let raw = URL_SAFE_NO_PAD.encode(build_message(to, subject, body));
        let url = format!("{}/users/me/messages/send", self.base_url);
        let response = self.client.post(&url, &json!({ "raw": raw })).await?;

        let id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Upstream("Gmail response did not include a message id".to_string()))?;

        debug!(%id, "Message sent");
        Ok(id.to_string())
    }

    /// List the most recent threads under a label, one page only.
    ///
    /// Each entry carries `id`, `snippet` and `historyId` as Gmail returns them.
    pub async fn list_threads(&self, label: &str, limit: u32) -> Result<Vec<Value>, Error> {
        info!(%label, limit, "Listing Gmail threads");

        let query = [
            ("labelIds", label.to_string()),
            ("maxResults", limit.to_string()),
        ];
        let url = format!("{}/users/me/threads", self.base_url);
        let response = self.client.get(&url, &query).await?;

        let mut threads = extract_array(&response, "threads");
        threads.truncate(limit as usize);

        debug!("Retrieved {} threads", threads.len());
        Ok(threads)
    }
}

/// RFC 2822 message with a plain-text UTF-8 body.
fn build_message(to: &str, subject: &str, body: &str) -> String {
    [
        "From: me".to_string(),
        format!("To: {}", to),
        format!("Subject: {}", subject),
        "Content-Type: text/plain; charset=UTF-8".to_string(),
        String::new(),
        body.to_string(),
    ]
    .join("\r\n")
}
