//! Where announcements go.

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Result, SpoilerError};

/// A sink that accepts text messages. Sends are best effort.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Stable id, part of the dedup record key.
    fn id(&self) -> &str;

    async fn send(&self, text: &str) -> Result<()>;
}

/// Writes each message to stdout followed by a blank line.
pub struct ConsoleDestination;

#[async_trait]
impl Destination for ConsoleDestination {
    fn id(&self) -> &str {
        "console"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        let message = format!("{text}\n\n");
        stdout
            .write_all(message.as_bytes())
            .await
            .map_err(|e| self.delivery_error(e))?;
        stdout.flush().await.map_err(|e| self.delivery_error(e))
    }
}

impl ConsoleDestination {
    fn delivery_error(&self, e: std::io::Error) -> SpoilerError {
        SpoilerError::Delivery {
            destination: self.id().to_owned(),
            reason: e.to_string(),
        }
    }
}

/// Posts messages to a chat webhook (`{"content": "..."}` bodies).
pub struct WebhookDestination {
    id: String,
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

impl WebhookDestination {
    pub fn new(id: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Destination for WebhookDestination {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content: text })
            .send()
            .await
            .map_err(|e| SpoilerError::Delivery {
                destination: self.id.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpoilerError::Delivery {
                destination: self.id.clone(),
                reason: format!("{status} - {body}"),
            });
        }
        debug!(destination = %self.id, "webhook accepted message");
        Ok(())
    }
}
