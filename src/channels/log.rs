//! A channel that logs notifications through `tracing`.
//!
//! This serves as a basic implementation to validate the pipeline and is
//! useful as an always-available audit trail alongside real channels.

use crate::core::{AlertEvent, NotificationChannel, NotificationResult};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Writes each notification to the log instead of an external system.
pub struct LogChannel {
    enabled: bool,
}

impl LogChannel {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn display_name(&self) -> &str {
        "Log"
    }

    // Nothing external to configure.
    fn is_configured(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, event: &AlertEvent) -> Result<NotificationResult> {
        info!(
            alert_id = %event.alert_id,
            alert_name = %event.alert_name,
            severity = %event.severity,
            status = ?event.status,
            message = %event.message,
            "Alert notification"
        );
        Ok(NotificationResult::success(self.name(), "logged"))
    }

    async fn test(&self) -> Result<NotificationResult> {
        info!("Log channel self-test");
        Ok(NotificationResult::success(self.name(), "log channel ok"))
    }
}
