//! Core domain types and service traits for the alert pipeline
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the pipeline.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How serious an alert is. Ordering matters: a grouped notification
/// carries the most severe level among its members.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Whether the underlying condition is still breached or has recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Firing,
    Resolved,
}

/// A single fired (or resolved) condition instance requiring notification.
///
/// Produced by an external condition evaluator and treated as immutable from
/// that point on. Identity for throttling purposes is `alert_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    /// Stable identity of the alert rule instance (e.g., "high-cpu:api-7").
    pub alert_id: String,
    /// Human-readable rule name, shared by related alerts.
    pub alert_name: String,
    pub severity: Severity,
    /// Free-form description of the breach.
    pub message: String,
    pub status: AlertStatus,
    /// Key/value labels attached by the evaluator. Sorted map so that label
    /// insertion order never influences identity or grouping.
    pub labels: BTreeMap<String, String>,
    /// When the evaluator observed the breach.
    pub fired_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Creates a new, minimal firing event containing only identity fields.
    /// Useful for evaluators and tests that do not care about labels.
    pub fn new_minimal(alert_id: &str, alert_name: &str) -> Self {
        Self {
            alert_id: alert_id.to_string(),
            alert_name: alert_name.to_string(),
            ..Default::default()
        }
    }

    /// Attaches a label, returning the modified event.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

impl Default for AlertEvent {
    fn default() -> Self {
        Self {
            alert_id: String::new(),
            alert_name: String::new(),
            severity: Severity::default(),
            message: String::new(),
            status: AlertStatus::default(),
            labels: BTreeMap::new(),
            fired_at: Utc::now(),
        }
    }
}

/// Outcome of handing one notification to one provider.
///
/// Partial failure is a first-class outcome: callers receive one of these
/// per provider and inspect `success` per entry. The pipeline never turns
/// "some providers failed" into an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    /// Name of the provider that produced this result, or a synthetic name
    /// such as "throttler" for policy outcomes.
    pub provider: String,
    pub success: bool,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl NotificationResult {
    /// A successful delivery result stamped with the current time.
    pub fn success(provider: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            success: true,
            message: message.into(),
            sent_at: Utc::now(),
            error_details: None,
        }
    }

    /// A failed delivery result carrying provider-specific details.
    pub fn failure(
        provider: &str,
        message: impl Into<String>,
        error_details: Option<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            message: message.into(),
            sent_at: Utc::now(),
            error_details,
        }
    }

    /// The synthetic result returned when the throttler rejects an event.
    /// Not an error, a policy outcome.
    pub fn throttled(alert_id: &str) -> Self {
        Self::failure(
            "throttler",
            format!("alert '{}' suppressed by cooldown or rate limit", alert_id),
            None,
        )
    }

    /// The synthetic result returned when a named provider is not registered.
    pub fn not_found(provider: &str) -> Self {
        Self::failure(
            provider,
            format!("provider '{}' is not registered", provider),
            None,
        )
    }

    /// Merges per-provider results into one combined result: success is the
    /// conjunction over all entries, error details are concatenated from the
    /// failing providers.
    pub fn merge(results: &[NotificationResult]) -> NotificationResult {
        let success = results.iter().all(|r| r.success);
        let failures: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| match &r.error_details {
                Some(details) => format!("{}: {}", r.provider, details),
                None => format!("{}: {}", r.provider, r.message),
            })
            .collect();
        NotificationResult {
            provider: "combined".to_string(),
            success,
            message: format!(
                "{}/{} providers succeeded",
                results.iter().filter(|r| r.success).count(),
                results.len()
            ),
            sent_at: Utc::now(),
            error_details: if failures.is_empty() {
                None
            } else {
                Some(failures.join("; "))
            },
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// A notification channel capability, implemented once per external system
/// (webhook, email, Slack, ...).
///
/// The pipeline depends only on this interface; concrete HTTP/SMTP mechanics
/// live behind it. Implementations own their own I/O timeouts.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// A unique, machine-friendly name for the channel (e.g., "webhook").
    /// Used as the registry key and for logging and metrics.
    fn name(&self) -> &str;

    /// A human-friendly name for display purposes.
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Whether the channel has everything it needs to send (URL, credentials).
    fn is_configured(&self) -> bool;

    /// Whether the channel is administratively enabled.
    fn is_enabled(&self) -> bool;

    /// Sends a notification for the given event.
    ///
    /// # Returns
    /// * `Ok(NotificationResult)` describing the delivery outcome
    /// * `Err` for transport-level failures; the dispatcher converts these
    ///   into failed results, they never propagate past it
    async fn send(&self, event: &AlertEvent) -> Result<NotificationResult>;

    /// Performs a channel self-test (e.g., posts a test message).
    async fn test(&self) -> Result<NotificationResult>;
}
