//! Messaging client: the external collaborator the relay forwards through.
//!
//! The daemon itself never speaks MTProto; a local gateway process owns the
//! session and exposes a small JSON API. `Messenger` is the seam the
//! forwarding loops are written against, `GatewayClient` is the HTTP glue.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};

/// Opaque channel handle: resolved once at startup, passed back into
/// fetch/send calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub title: String,
}

/// Read-only message snapshot from one polling cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// None for media-only messages.
    pub text: Option<String>,
    pub date: DateTime<FixedOffset>,
}

/// The three capabilities the forwarding loops need from the service.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// All dialogs visible to the authenticated account.
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    /// The most recent `limit` messages of a channel, newest-first.
    async fn fetch_recent(&self, channel: &Channel, limit: usize) -> Result<Vec<Message>>;

    /// Send plain text to a channel. Returns `Error::RateLimited` when the
    /// service signals a flood condition.
    async fn send_text(&self, channel: &Channel, text: &str) -> Result<()>;
}

/// HTTP client for the local MTProto gateway.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ConnectResponse {
    authorized: bool,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Open the session, prompting for a one-time code if the account is
    /// not yet authorized on this gateway.
    pub async fn connect(&self, phone: &str, api_id: i64, api_hash: &str) -> Result<()> {
        info!("Connecting user...");

        let response = self
            .http
            .post(format!("{}/session/connect", self.base_url))
            .json(&json!({ "phone": phone, "api_id": api_id, "api_hash": api_hash }))
            .send()
            .await?;
        let connect: ConnectResponse = Self::check(response).await?.json().await?;

        if !connect.authorized {
            self.http
                .post(format!("{}/session/send_code", self.base_url))
                .json(&json!({ "phone": phone }))
                .send()
                .await?;

            let code = read_code_from_stdin().await?;
            let response = self
                .http
                .post(format!("{}/session/sign_in", self.base_url))
                .json(&json!({ "phone": phone, "code": code }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(Error::Auth(format!(
                    "sign-in rejected: {}",
                    response.text().await.unwrap_or_default()
                )));
            }
        }

        info!("Connecting user...done");
        Ok(())
    }

    /// Map gateway HTTP failures onto crate errors. 429 is the flood signal.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                retry_after: parse_retry_after(&body),
            });
        }
        Err(Error::Gateway(format!("{}: {}", status, body)))
    }
}

#[async_trait]
impl Messenger for GatewayClient {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let response = self
            .http
            .get(format!("{}/dialogs", self.base_url))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn fetch_recent(&self, channel: &Channel, limit: usize) -> Result<Vec<Message>> {
        let response = self
            .http
            .get(format!("{}/messages", self.base_url))
            .query(&[("peer", channel.id.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn send_text(&self, channel: &Channel, text: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/messages/send", self.base_url))
            .json(&json!({ "peer": channel.id, "text": text }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Pull `retry_after` out of a flood response body, defaulting to 0.
fn parse_retry_after(body: &str) -> u64 {
    #[derive(Deserialize)]
    struct FloodBody {
        retry_after: u64,
    }
    serde_json::from_str::<FloodBody>(body)
        .map(|f| f.retry_after)
        .unwrap_or(0)
}

async fn read_code_from_stdin() -> Result<String> {
    tokio::task::spawn_blocking(|| -> Result<String> {
        print!("Enter the code: ");
        use std::io::Write;
        std::io::stdout().flush()?;
        let mut code = String::new();
        std::io::stdin().read_line(&mut code)?;
        Ok(code.trim().to_string())
    })
    .await
    .map_err(|e| Error::Gateway(format!("stdin task failed: {}", e)))?
}
