//! Batching of admitted events into grouped notifications.
//!
//! Events sharing a derived `GroupKey` are buffered in a pending-groups
//! table and flushed as one combined notification, either when the
//! `group_wait` debounce timer expires or immediately once a group reaches
//! `max_group_size`. Removal from the table is the single atomicity point:
//! a group leaves the table exactly once, so concurrent triggers (timer,
//! size cap, manual flush) cannot double-send.

use crate::config::ThrottleConfig;
use crate::core::{AlertEvent, AlertStatus, NotificationResult, Severity};
use crate::dispatch::Dispatcher;
use crate::formatting::{SummaryTextFormatter, TextFormatter};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// The derived identity of a batch: alert name, severity, and the values of
/// the configured `group_by_labels`. Built on a sorted map so equality and
/// hashing are independent of label insertion order; labels outside the
/// configured subset never influence the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    alert_name: String,
    severity: Severity,
    labels: BTreeMap<String, String>,
}

impl GroupKey {
    /// Derives the key for `event` under the given grouping labels.
    pub fn from_event(event: &AlertEvent, group_by_labels: &[String]) -> Self {
        let labels = group_by_labels
            .iter()
            .filter_map(|name| {
                event
                    .labels
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Self {
            alert_name: event.alert_name.clone(),
            severity: event.severity,
            labels,
        }
    }

    pub fn alert_name(&self) -> &str {
        &self.alert_name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// A stable hex digest of the key, used as the combined notification's
    /// alert id and in logs.
    pub fn fingerprint(&self) -> String {
        let mut data = format!("{}\x1f{}", self.alert_name, self.severity);
        for (name, value) in &self.labels {
            data.push('\x1f');
            data.push_str(name);
            data.push('=');
            data.push_str(value);
        }
        blake3::hash(data.as_bytes()).to_hex().to_string()
    }
}

/// A read-only view of one pending group.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub key: GroupKey,
    pub event_count: usize,
    pub created_at: DateTime<Utc>,
}

struct PendingGroup {
    events: Vec<AlertEvent>,
    created_at: DateTime<Utc>,
    flush_timer: JoinHandle<()>,
}

type FlushListener = Box<dyn Fn(&GroupKey, &[AlertEvent]) + Send + Sync>;

/// The grouping engine: buffers admitted events per key and forwards one
/// combined notification per group to the dispatcher.
///
/// Cheap to clone; clones share the pending-groups table. The per-group
/// flush timers hold their own handle to the shared state, so a `Grouper`
/// value can be dropped without orphaning scheduled flushes.
#[derive(Clone)]
pub struct Grouper {
    inner: Arc<GrouperInner>,
}

struct GrouperInner {
    config: ThrottleConfig,
    dispatcher: Arc<Dispatcher>,
    formatter: Box<dyn TextFormatter>,
    groups: DashMap<GroupKey, PendingGroup>,
    listeners: RwLock<Vec<FlushListener>>,
}

impl Grouper {
    pub fn new(config: ThrottleConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(GrouperInner {
                config,
                dispatcher,
                formatter: Box::new(SummaryTextFormatter),
                groups: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Registers an observer that receives each group at flush time. Used
    /// for audit and metrics by callers; not required for delivery.
    pub fn add_listener(
        &self,
        listener: impl Fn(&GroupKey, &[AlertEvent]) + Send + Sync + 'static,
    ) {
        self.inner
            .listeners
            .write()
            .unwrap()
            .push(Box::new(listener));
    }

    /// Adds an event to the pipeline.
    ///
    /// With grouping disabled the event is dispatched immediately and its
    /// results are returned. With grouping enabled the event joins (or
    /// creates) the pending group for its key; reaching `max_group_size`
    /// flushes the group before this call returns. Returns `None` when the
    /// event was buffered and the debounce timer owns the eventual flush.
    pub async fn add_alert(&self, event: AlertEvent) -> Option<Vec<NotificationResult>> {
        let inner = &self.inner;
        if !inner.config.grouping {
            return Some(inner.dispatcher.dispatch(&event).await);
        }

        let key = GroupKey::from_event(&event, &inner.config.group_by_labels);
        let hit_cap = match inner.groups.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let group = entry.get_mut();
                group.events.push(event);
                group.events.len() >= inner.config.max_group_size
            }
            Entry::Vacant(entry) => {
                debug!(group = %key.fingerprint(), "Opened new alert group");
                let flush_timer = self.spawn_flush_timer(key.clone());
                entry.insert(PendingGroup {
                    events: vec![event],
                    created_at: Utc::now(),
                    flush_timer,
                });
                inner.config.max_group_size <= 1
            }
        };
        metrics::gauge!("pending_groups").set(inner.groups.len() as f64);

        if hit_cap {
            debug!(group = %key.fingerprint(), "Group reached size cap, flushing");
            return Some(self.flush_group(&key).await);
        }
        None
    }

    /// Flushes the group for `key`, if one is pending. Idempotent: an
    /// absent group (already flushed or never existed) is a no-op that
    /// returns an empty result list.
    pub async fn flush_group(&self, key: &GroupKey) -> Vec<NotificationResult> {
        match self.inner.groups.remove(key) {
            Some((key, group)) => {
                // Cancel the debounce timer; if it has already fired it lost
                // the removal race above and will no-op.
                group.flush_timer.abort();
                self.inner.dispatch_group(key, group).await
            }
            None => Vec::new(),
        }
    }

    /// Flushes every pending group concurrently, resolving once all
    /// dispatches have settled.
    #[instrument(skip_all, fields(pending = self.inner.groups.len()))]
    pub async fn flush_all(&self) -> Vec<NotificationResult> {
        let keys: Vec<GroupKey> = self.inner.groups.iter().map(|e| e.key().clone()).collect();
        let results = join_all(keys.iter().map(|key| self.flush_group(key))).await;
        results.into_iter().flatten().collect()
    }

    /// Number of currently pending groups.
    pub fn pending_group_count(&self) -> usize {
        self.inner.groups.len()
    }

    /// Total number of buffered events across all pending groups.
    pub fn pending_alert_count(&self) -> usize {
        self.inner.groups.iter().map(|e| e.value().events.len()).sum()
    }

    /// Snapshots of all pending groups, for diagnostics.
    pub fn pending_groups(&self) -> Vec<GroupSnapshot> {
        self.inner
            .groups
            .iter()
            .map(|e| GroupSnapshot {
                key: e.key().clone(),
                event_count: e.value().events.len(),
                created_at: e.value().created_at,
            })
            .collect()
    }

    /// The buffered events for `key`, if a group is pending.
    pub fn find_group(&self, key: &GroupKey) -> Option<Vec<AlertEvent>> {
        self.inner.groups.get(key).map(|e| e.value().events.clone())
    }

    fn spawn_flush_timer(&self, key: GroupKey) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let wait = inner.config.group_wait();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // The timer performs its own removal rather than going through
            // flush_group so it never aborts the task it is running on.
            if let Some((key, group)) = inner.groups.remove(&key) {
                inner.dispatch_group(key, group).await;
            }
        })
    }
}

impl GrouperInner {
    async fn dispatch_group(&self, key: GroupKey, group: PendingGroup) -> Vec<NotificationResult> {
        metrics::gauge!("pending_groups").set(self.groups.len() as f64);
        metrics::counter!("groups_flushed_total").increment(1);
        debug!(
            group = %key.fingerprint(),
            events = group.events.len(),
            "Flushing alert group"
        );

        for listener in self.listeners.read().unwrap().iter() {
            listener(&key, &group.events);
        }

        let summary = self.build_summary(&key, group.events);
        self.dispatcher.dispatch(&summary).await
    }

    /// Collapses a group into the event that actually gets dispatched.
    /// Single-event groups forward the original event untouched; larger
    /// groups produce a combined event whose message carries the
    /// "[N alerts grouped]" marker, with members in arrival order.
    fn build_summary(&self, key: &GroupKey, mut events: Vec<AlertEvent>) -> AlertEvent {
        if events.len() == 1 {
            return events.pop().expect("group holds at least one event");
        }

        let severity = events
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or(key.severity());
        let status = if events.iter().any(|e| e.status == AlertStatus::Firing) {
            AlertStatus::Firing
        } else {
            AlertStatus::Resolved
        };
        let fired_at = events.first().map(|e| e.fired_at).unwrap_or_else(Utc::now);

        AlertEvent {
            alert_id: key.fingerprint(),
            alert_name: key.alert_name().to_string(),
            severity,
            message: self.formatter.format_batch(&events),
            status,
            labels: key.labels().clone(),
            fired_at,
        }
    }
}
