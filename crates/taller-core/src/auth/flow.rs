//! Interactive consent flow
//!
//! A loopback listener on an ephemeral port receives the provider's redirect
//! after the user grants consent in a browser.

use std::collections::HashMap;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client_secrets::ClientSecrets;
use super::provider::OAuthProvider;
use crate::common::Error;

/// How long one browser connection may take to deliver its request.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// An authorization that is waiting for the user to finish consent.
pub struct PendingAuthorization {
    listener: TcpListener,
    state: String,
    code_verifier: String,
    redirect_uri: String,
    auth_url: String,
}

/// What the redirect delivered, ready for the code exchange.
#[derive(Debug)]
pub struct AuthorizationCode {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// How a single redirect request was answered.
enum Callback {
    Code(String),
    Denied(String),
    StateMismatch,
    Ignored,
}

impl PendingAuthorization {
    /// Bind the loopback listener and build the consent URL for it.
    pub async fn start(
        provider: &dyn OAuthProvider,
        client: &ClientSecrets,
        scopes: &[String],
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::AuthFlow(format!("Failed to bind redirect listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::AuthFlow(format!("Failed to read listener address: {}", e)))?
            .port();

        let redirect_uri = format!("http://127.0.0.1:{}", port);
        let (code_verifier, code_challenge) = pkce_pair();
        let state = random_state();
        let auth_url =
            provider.authorize_url(client, scopes, &state, &code_challenge, &redirect_uri);

        info!(provider = provider.name(), %redirect_uri, "Waiting for authorization redirect");

        Ok(Self {
            listener,
            state,
            code_verifier,
            redirect_uri,
            auth_url,
        })
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect carrying the authorization code.
    ///
    /// Requests that are not the redirect (favicon fetches and the like) get a
    /// 404 and the wait goes on. `timeout` of `None` waits until cancelled.
    pub async fn wait_for_code(
        self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<AuthorizationCode, Error> {
        let wait = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, self.accept_redirect())
                    .await
                    .map_err(|_| {
                        Error::AuthFlow(format!(
                            "Authorization timed out after {} seconds",
                            limit.as_secs()
                        ))
                    })?,
                None => self.accept_redirect().await,
            }
        };

        let code = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Authorization cancelled before the redirect arrived");
                return Err(Error::AuthFlow("Authorization cancelled".to_string()));
            }
            result = wait => result?,
        };

        Ok(AuthorizationCode {
            code,
            code_verifier: self.code_verifier,
            redirect_uri: self.redirect_uri,
        })
    }

    /// Serve each connection on its own task so an idle socket (a browser
    /// preconnect, say) cannot hold up the real redirect.
    async fn accept_redirect(&self) -> Result<String, Error> {
        let (tx, mut rx) = mpsc::channel::<Callback>(8);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, peer) = accepted.map_err(|e| {
                        Error::AuthFlow(format!("Redirect listener failed: {}", e))
                    })?;
                    debug!(%peer, "Redirect listener accepted a connection");

                    let state = self.state.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let handled =
                            tokio::time::timeout(CONNECTION_TIMEOUT, handle_connection(socket, &state))
                                .await;
                        match handled {
                            Ok(Ok(callback)) => {
                                let _ = tx.send(callback).await;
                            }
                            Ok(Err(e)) => {
                                debug!(%peer, error = %e, "Dropping unreadable redirect connection")
                            }
                            Err(_) => debug!(%peer, "Dropping idle redirect connection"),
                        }
                    });
                }
                Some(callback) = rx.recv() => match callback {
                    Callback::Code(code) => return Ok(code),
                    Callback::Denied(reason) => {
                        return Err(Error::AuthFlow(format!("Consent was not granted: {}", reason)))
                    }
                    Callback::StateMismatch => {
                        return Err(Error::AuthFlow(
                            "Redirect state did not match the pending authorization".to_string(),
                        ))
                    }
                    Callback::Ignored => {}
                },
            }
        }
    }
}

/// Read one request from the browser and answer it.
async fn handle_connection(mut socket: TcpStream, expected_state: &str) -> std::io::Result<Callback> {
    let request_line = {
        let mut reader = BufReader::new(&mut socket);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        // Drain headers so the browser sees a clean response.
        let mut header = String::new();
        loop {
            header.clear();
            let n = reader.read_line(&mut header).await?;
            if n == 0 || header == "\r\n" || header == "\n" {
                break;
            }
        }
        request_line
    };

    // "GET /?code=...&state=... HTTP/1.1"
    let target = request_line.split_whitespace().nth(1).unwrap_or("");
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    let params = parse_query_params(query);

    let (status, message, callback) = if let Some(error) = params.get("error") {
        let reason = match params.get("error_description") {
            Some(desc) => format!("{} ({})", error, desc),
            None => error.clone(),
        };
        (
            "400 Bad Request",
            format!("Authorization failed: {}", reason),
            Callback::Denied(reason),
        )
    } else if let Some(code) = params.get("code") {
        if params.get("state").map(String::as_str) != Some(expected_state) {
            (
                "400 Bad Request",
                "Authorization failed: state mismatch. Please start again.".to_string(),
                Callback::StateMismatch,
            )
        } else {
            (
                "200 OK",
                "Authorization complete. You can close this tab.".to_string(),
                Callback::Code(code.clone()),
            )
        }
    } else {
        ("404 Not Found", "Not found".to_string(), Callback::Ignored)
    };

    send_response(&mut socket, status, &result_page(&message)).await?;
    Ok(callback)
}

/// S256 PKCE: a 43-character verifier and its challenge.
fn pkce_pair() -> (String, String) {
    let verifier = URL_SAFE_NO_PAD.encode(OsRng.gen::<[u8; 32]>());
    let challenge = challenge_for(&verifier);
    (verifier, challenge)
}

fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_state() -> String {
    hex::encode(OsRng.gen::<[u8; 16]>())
}

/// Parse URL query parameters into a map, percent-decoding values.
fn parse_query_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key.to_string(), value))
        })
        .collect()
}

async fn send_response(socket: &mut TcpStream, status: &str, html: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        html.len(),
        html
    );
    socket.write_all(response.as_bytes()).await?;
    socket.flush().await
}

fn result_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Taller authorization</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 4rem;">
    <h1>Taller</h1>
    <p>{}</p>
</body>
</html>"#,
        message
    )
}
