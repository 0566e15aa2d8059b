//! Admission control for outbound notifications.
//!
//! The `Throttler` combines two policies into one atomic decision:
//! a per-alert cooldown (no two notifications for the same alert id within
//! `cooldown`) and a global sliding-window rate limit across all alerts.
//! `try_acquire` is the only method producers should call in production;
//! the check and the recording of the send are a single critical section
//! per alert id so that concurrent producers cannot race past the policy.

use crate::config::ThrottleConfig;
use crate::core::AlertEvent;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on tracked alert ids. Beyond this the throttler admits new
/// ids best-effort without tracking them instead of growing unbounded.
const MAX_TRACKED_IDS: usize = 100_000;

/// Entries idle for this many cooldown periods are evicted by the reaper.
const REAP_AFTER_COOLDOWNS: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct AlertState {
    last_sent_at: Instant,
}

/// The throttle decision engine.
///
/// Shared mutable state is limited to the per-alert table (sharded, one
/// entry lock per alert id) and the global window (a single short-lived
/// mutex over a timestamp list). Unrelated alerts never serialize against
/// each other beyond the window push.
pub struct Throttler {
    config: ThrottleConfig,
    states: DashMap<String, AlertState>,
    window: Mutex<VecDeque<Instant>>,
}

impl Throttler {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Atomically checks admission for `event` and, if admitted, records the
    /// send. Returns `true` when the caller may proceed to dispatch.
    ///
    /// The per-alert entry lock is held across both the cooldown check and
    /// the recording, so two concurrent calls for the same alert id cannot
    /// both be admitted inside one cooldown period.
    pub fn try_acquire(&self, event: &AlertEvent) -> bool {
        let now = Instant::now();
        // Capacity probe happens outside the entry lock; the cap is
        // best-effort by contract.
        let at_capacity = self.states.len() >= MAX_TRACKED_IDS;

        let admitted = match self.states.entry(event.alert_id.clone()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(entry.get().last_sent_at) < self.config.cooldown() {
                    debug!(alert_id = %event.alert_id, "Suppressed by per-alert cooldown");
                    false
                } else if !self.admit_and_record_window(now) {
                    debug!(alert_id = %event.alert_id, "Suppressed by global rate limit");
                    false
                } else {
                    entry.get_mut().last_sent_at = now;
                    true
                }
            }
            Entry::Vacant(entry) => {
                // First-ever send for an id is never blocked by cooldown.
                if !self.admit_and_record_window(now) {
                    debug!(alert_id = %event.alert_id, "Suppressed by global rate limit");
                    false
                } else {
                    if at_capacity {
                        warn!(
                            alert_id = %event.alert_id,
                            tracked = MAX_TRACKED_IDS,
                            "Throttle table at capacity; admitting without cooldown tracking"
                        );
                    } else {
                        entry.insert(AlertState { last_sent_at: now });
                    }
                    true
                }
            }
        };

        if !admitted {
            metrics::counter!("alerts_throttled_total").increment(1);
        }
        admitted
    }

    /// Read-only admission check, for diagnostics and tests. Unlike
    /// `try_acquire` this records nothing and offers no atomicity to
    /// concurrent callers.
    pub fn should_send(&self, event: &AlertEvent) -> bool {
        let now = Instant::now();
        if let Some(state) = self.states.get(&event.alert_id) {
            if now.duration_since(state.last_sent_at) < self.config.cooldown() {
                return false;
            }
        }
        if self.config.rate_limit == 0 {
            return true;
        }
        let window = self.window.lock().unwrap();
        let period = self.config.rate_period();
        let in_window = window
            .iter()
            .filter(|t| now.duration_since(**t) < period)
            .count();
        in_window < self.config.rate_limit as usize
    }

    /// Unconditionally records a send for `event`. Used internally by
    /// `try_acquire`; exposed for tests.
    pub fn record_sent(&self, event: &AlertEvent) {
        let now = Instant::now();
        self.states
            .insert(event.alert_id.clone(), AlertState { last_sent_at: now });
        if self.config.rate_limit > 0 {
            self.window.lock().unwrap().push_back(now);
        }
    }

    /// Clears cooldown state for a single alert id.
    pub fn reset(&self, alert_id: &str) {
        self.states.remove(alert_id);
    }

    /// Clears all cooldown state and the global window.
    pub fn reset_all(&self) {
        self.states.clear();
        self.window.lock().unwrap().clear();
    }

    /// Number of alert ids currently tracked. Diagnostics only.
    pub fn tracked_ids(&self) -> usize {
        self.states.len()
    }

    /// Evicts per-alert entries whose last send is older than a small
    /// multiple of the cooldown, bounding memory under high id cardinality.
    pub fn reap(&self) {
        let horizon = self.config.cooldown() * REAP_AFTER_COOLDOWNS;
        let now = Instant::now();
        let before = self.states.len();
        self.states
            .retain(|_, state| now.duration_since(state.last_sent_at) < horizon);
        let evicted = before - self.states.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.states.len(), "Reaped idle throttle entries");
        }
        metrics::gauge!("throttle_tracked_ids").set(self.states.len() as f64);
    }

    /// Background eviction loop. Spawned by the composition root; exits on
    /// the shutdown signal.
    pub async fn run_reaper(&self, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh pipeline does
        // not reap before anything has been tracked.
        timer.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Throttle reaper received shutdown signal.");
                    break;
                }
                _ = timer.tick() => {
                    self.reap();
                }
            }
        }
    }

    fn admit_and_record_window(&self, now: Instant) -> bool {
        if self.config.rate_limit == 0 {
            return true;
        }
        let mut window = self.window.lock().unwrap();
        let period = self.config.rate_period();
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= period)
        {
            window.pop_front();
        }
        if window.len() >= self.config.rate_limit as usize {
            false
        } else {
            window.push_back(now);
            true
        }
    }
}
