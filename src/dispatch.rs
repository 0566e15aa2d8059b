//! Fan-out of notifications to the registered channels.
//!
//! The `Dispatcher` owns the live provider registry and turns one (possibly
//! already-grouped) event into one `NotificationResult` per configured and
//! enabled channel. Every provider call is isolated: an error or panic in
//! one channel becomes a failed result for that channel only and never
//! blocks or aborts its siblings.

use crate::core::{AlertEvent, NotificationChannel, NotificationResult};
use crate::throttle::Throttler;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, instrument, warn};

/// Dispatches events to every configured and enabled notification channel.
pub struct Dispatcher {
    throttler: Arc<Throttler>,
    // Sorted by provider name so result order is deterministic for callers.
    providers: RwLock<BTreeMap<String, Arc<dyn NotificationChannel>>>,
}

impl Dispatcher {
    pub fn new(throttler: Arc<Throttler>) -> Self {
        Self {
            throttler,
            providers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds a channel to the registry, keyed by its name. A later
    /// registration under the same name replaces the earlier one.
    pub fn register_provider(&self, provider: Arc<dyn NotificationChannel>) {
        let name = provider.name().to_string();
        let replaced = self
            .providers
            .write()
            .unwrap()
            .insert(name.clone(), provider);
        if replaced.is_some() {
            warn!(provider = %name, "Replaced an already-registered provider");
        } else {
            debug!(provider = %name, "Registered provider");
        }
    }

    /// Removes a channel from the registry. Returns whether it was present.
    pub fn unregister_provider(&self, name: &str) -> bool {
        self.providers.write().unwrap().remove(name).is_some()
    }

    /// Names of all registered providers, in registry order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.read().unwrap().keys().cloned().collect()
    }

    /// Sends `event` to all configured and enabled providers concurrently.
    ///
    /// The throttler is consulted first: a rejected event produces a single
    /// synthetic "throttler" failure and no provider calls. With no eligible
    /// providers the result is an empty list, not an error. The returned
    /// future resolves only once every provider call has settled.
    #[instrument(skip_all, fields(alert_id = %event.alert_id))]
    pub async fn dispatch(&self, event: &AlertEvent) -> Vec<NotificationResult> {
        if !self.throttler.try_acquire(event) {
            debug!(alert_id = %event.alert_id, "Dispatch suppressed by throttler");
            return vec![NotificationResult::throttled(&event.alert_id)];
        }

        let selected: Vec<Arc<dyn NotificationChannel>> = self
            .providers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.is_configured() && p.is_enabled())
            .cloned()
            .collect();

        if selected.is_empty() {
            debug!(alert_id = %event.alert_id, "No configured and enabled providers");
            return Vec::new();
        }

        // Each send runs in its own task so a panicking provider cannot take
        // its siblings down with it.
        let sends: Vec<_> = selected
            .into_iter()
            .map(|provider| {
                let name = provider.name().to_string();
                let event = event.clone();
                let handle =
                    tokio::spawn(async move { Self::send_one(provider, &event).await });
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<_>, Vec<_>) = sends.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(provider = %name, error = %e, "Provider send task panicked");
                    NotificationResult::failure(
                        &name,
                        "notification task panicked",
                        Some(e.to_string()),
                    )
                }
            })
            .collect()
    }

    /// Sends `event` to a single named provider, bypassing throttling and
    /// the configured/enabled selection. Used for "send test notification"
    /// flows. Unknown names fail fast with a not-found result.
    pub async fn dispatch_to(&self, event: &AlertEvent, name: &str) -> NotificationResult {
        let provider = self.providers.read().unwrap().get(name).cloned();
        match provider {
            Some(provider) => Self::send_one(provider, event).await,
            None => NotificationResult::not_found(name),
        }
    }

    /// Runs the named provider's own self-test, bypassing throttle and
    /// grouping entirely.
    pub async fn test_provider(&self, name: &str) -> NotificationResult {
        let provider = self.providers.read().unwrap().get(name).cloned();
        let Some(provider) = provider else {
            return NotificationResult::not_found(name);
        };
        match provider.test().await {
            Ok(result) => result,
            Err(e) => {
                error!(provider = %name, error = %e, "Provider self-test failed");
                NotificationResult::failure(name, "self-test failed", Some(e.to_string()))
            }
        }
    }

    async fn send_one(
        provider: Arc<dyn NotificationChannel>,
        event: &AlertEvent,
    ) -> NotificationResult {
        let name = provider.name().to_string();
        match provider.send(event).await {
            Ok(result) => {
                if result.success {
                    metrics::counter!("notifications_sent_total").increment(1);
                } else {
                    metrics::counter!("notifications_failed_total").increment(1);
                }
                result
            }
            Err(e) => {
                error!(provider = %name, alert_id = %event.alert_id, error = %e, "Provider send failed");
                metrics::counter!("notifications_failed_total").increment(1);
                NotificationResult::failure(&name, "send failed", Some(e.to_string()))
            }
        }
    }
}
