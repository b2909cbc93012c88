use std::time::Duration;

use anyhow::{Context, Result, bail};
use failed_log_core::util::truncate_chars;
use serde::Serialize;

use crate::Message;

/// Response of a successful delivery.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeliveryResult {
    pub text: String,
}

/// Destination for a rendered message.
pub trait MessageSink: Sync {
    fn deliver(&self, message: &Message) -> impl Future<Output = Result<DeliveryResult>> + Send;
}

/// Slack incoming webhook client. Delivery is attempted once.
#[derive(Clone)]
pub struct SlackWebhook {
    http: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "failed-log-notify/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create Slack webhook client")?;
        Ok(Self { http, url: url.into() })
    }
}

impl MessageSink for SlackWebhook {
    async fn deliver(&self, message: &Message) -> Result<DeliveryResult> {
        let response = self
            .http
            .post(&self.url)
            .json(message)
            .send()
            .await
            .context("Failed to send Slack webhook request")?;
        let status = response.status();
        let text = response.text().await.context("Failed to read Slack webhook response")?;
        if !status.is_success() {
            bail!("Slack webhook request failed with status {}: {}", status, truncate_chars(&text, 200));
        }
        tracing::debug!("Delivered Slack message ({} attachments)", message.attachments.len());
        Ok(DeliveryResult { text })
    }
}
