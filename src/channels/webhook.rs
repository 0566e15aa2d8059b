//! A channel that posts alert notifications to a generic HTTP webhook.

use crate::config::WebhookConfig;
use crate::core::{AlertEvent, NotificationChannel, NotificationResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task;
use tracing::{error, info, instrument};

/// Posts each notification as a JSON document to a configured endpoint.
pub struct WebhookChannel {
    url: String,
    enabled: bool,
    timeout: std::time::Duration,
}

impl WebhookChannel {
    /// Creates a new `WebhookChannel` from its configuration section.
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            url: config.url.clone(),
            enabled: config.enabled,
            timeout: std::time::Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Sends the request in a blocking manner.
    fn send_request(
        client: reqwest::blocking::Client,
        url: &str,
        payload: &Value,
    ) -> Result<()> {
        let response = client.post(url).json(payload).send();

        match response {
            Ok(res) => {
                if res.status().is_success() {
                    Ok(())
                } else {
                    let status = res.status();
                    let text = res.text().unwrap_or_default();
                    error!(
                        status = %status,
                        body = %text,
                        "Webhook endpoint rejected the notification"
                    );
                    anyhow::bail!(
                        "webhook returned status {}, body: {}",
                        status,
                        text
                    );
                }
            }
            Err(e) => {
                error!(error = %e, "HTTP request to webhook failed");
                Err(e.into())
            }
        }
    }

    /// Runs one delivery off the async scheduler. Provider I/O must never
    /// run on a timer thread, so the blocking client lives in the blocking
    /// pool with its own timeout.
    async fn post(&self, payload: Value) -> Result<()> {
        let url = self.url.clone();
        let timeout = self.timeout;
        let result = task::spawn_blocking(move || {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?;
            Self::send_request(client, &url, &payload)
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Webhook delivery task failed");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn display_name(&self) -> &str {
        "Generic Webhook"
    }

    fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip(self, event), fields(alert_id = %event.alert_id))]
    async fn send(&self, event: &AlertEvent) -> Result<NotificationResult> {
        let payload = json!({
            "source": "alertpipe",
            "event": event,
        });
        self.post(payload).await?;
        info!(alert_id = %event.alert_id, "Delivered notification to webhook");
        Ok(NotificationResult::success(
            self.name(),
            format!("delivered alert '{}'", event.alert_id),
        ))
    }

    async fn test(&self) -> Result<NotificationResult> {
        let payload = json!({
            "source": "alertpipe",
            "test": true,
        });
        self.post(payload).await?;
        Ok(NotificationResult::success(self.name(), "test delivery ok"))
    }
}
