//! Reusable fake channels for integration tests.

use crate::core::{AlertEvent, NotificationChannel, NotificationResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A fake channel that records every event it is asked to send.
#[derive(Clone)]
pub struct RecordingChannel {
    name: &'static str,
    received: Arc<Mutex<Vec<AlertEvent>>>,
    notifier: Arc<Notify>,
}

impl RecordingChannel {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            received: Arc::new(Mutex::new(Vec::new())),
            notifier: Arc::new(Notify::new()),
        })
    }

    /// All events received so far, in arrival order.
    pub fn received(&self) -> Vec<AlertEvent> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Blocks until at least `target` events have arrived.
    pub async fn wait_for_count(&self, target: usize, timeout: std::time::Duration) {
        let wait_future = async {
            while self.received_count() < target {
                self.notifier.notified().await;
            }
        };

        tokio::time::timeout(timeout, wait_future)
            .await
            .expect("Timed out waiting for notifications");
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &AlertEvent) -> Result<NotificationResult> {
        self.received.lock().unwrap().push(event.clone());
        self.notifier.notify_one();
        Ok(NotificationResult::success(self.name, "recorded"))
    }

    async fn test(&self) -> Result<NotificationResult> {
        Ok(NotificationResult::success(self.name, "test ok"))
    }
}

/// A fake channel whose sends always fail at the transport level.
pub struct FailingChannel {
    name: &'static str,
}

impl FailingChannel {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name })
    }
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn name(&self) -> &str {
        self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, _event: &AlertEvent) -> Result<NotificationResult> {
        Err(anyhow!("simulated transport failure"))
    }

    async fn test(&self) -> Result<NotificationResult> {
        Err(anyhow!("simulated transport failure"))
    }
}
