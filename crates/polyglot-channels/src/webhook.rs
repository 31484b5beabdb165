//! Webhook delivery (Discord-compatible `{content, username, avatar_url}` body).

use async_trait::async_trait;
use polyglot_core::{error::PolyglotError, message::Delivery, traits::Sink};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Posts deliveries to the sink URL.
pub struct WebhookSink {
    client: reqwest::Client,
    username: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

impl WebhookSink {
    /// `username` is used when a delivery carries no author.
    pub fn new(username: impl Into<String>, timeout: Duration) -> Result<Self, PolyglotError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PolyglotError::Channel(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            username: username.into(),
        })
    }
}

fn payload<'a>(delivery: &'a Delivery, fallback_name: &'a str) -> WebhookPayload<'a> {
    let author = delivery.author.as_ref();
    WebhookPayload {
        content: &delivery.text,
        username: author.map(|a| a.name.as_str()).unwrap_or(fallback_name),
        avatar_url: author.and_then(|a| a.avatar_url.as_deref()),
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), PolyglotError> {
        let body = payload(delivery, &self.username);
        let resp = self
            .client
            .post(&delivery.sink)
            .json(&body)
            .send()
            .await
            .map_err(|e| PolyglotError::Channel(format!("webhook request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PolyglotError::Channel(format!(
                "webhook returned {status}: {text}"
            )));
        }
        debug!("webhook: delivered {} chars", delivery.text.chars().count());
        Ok(())
    }
}
