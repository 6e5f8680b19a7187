//! Adapter health bookkeeping.
//!
//! The core never talks to an adapter; it only observes what the runtime
//! reports — connects, events, errors — and derives staleness from the
//! policy's health window. A stale adapter's items decay faster and
//! eventually expire; the adapter itself owns its reconnect/backoff story.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::time::Millis;

/// Observed state of one source adapter.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterState {
    pub connected: bool,
    pub last_seen: Option<Millis>,
    pub consecutive_errors: u32,
    pub events_seen: u64,
    pub last_error: Option<String>,
    /// When the adapter was registered; the staleness baseline until the
    /// first event arrives.
    pub registered_at: Millis,
}

impl AdapterState {
    fn new(registered_at: Millis) -> Self {
        Self {
            connected: false,
            last_seen: None,
            consecutive_errors: 0,
            events_seen: 0,
            last_error: None,
            registered_at,
        }
    }

    /// No event inside the health window. Before the first event the
    /// registration time is the baseline, so a source that never produces
    /// goes stale too.
    pub fn is_stale(&self, now: Millis, window: Millis) -> bool {
        let baseline = self.last_seen.unwrap_or(self.registered_at);
        now.saturating_sub(baseline) > window
    }
}

/// Registry of all adapters, keyed by source id.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    adapters: HashMap<String, AdapterState>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source_id: &str, now: Millis) {
        self.adapters
            .entry(source_id.to_string())
            .or_insert_with(|| AdapterState::new(now));
    }

    pub fn mark_connected(&mut self, source_id: &str, connected: bool) {
        if let Some(state) = self.adapters.get_mut(source_id) {
            state.connected = connected;
        }
    }

    /// An event arrived from this source. Clears the error streak.
    pub fn record_event(&mut self, source_id: &str, now: Millis) {
        if let Some(state) = self.adapters.get_mut(source_id) {
            state.last_seen = Some(now);
            state.events_seen += 1;
            state.consecutive_errors = 0;
        }
    }

    pub fn record_error(&mut self, source_id: &str, error: &str) {
        if let Some(state) = self.adapters.get_mut(source_id) {
            state.consecutive_errors = state.consecutive_errors.saturating_add(1);
            state.last_error = Some(error.to_string());
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&AdapterState> {
        self.adapters.get(source_id)
    }

    /// Sources outside their health window right now.
    pub fn stale_sources(&self, now: Millis, window: Millis) -> HashSet<String> {
        self.adapters
            .iter()
            .filter(|(_, state)| state.is_stale(now, window))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn snapshot(&self) -> HashMap<String, AdapterState> {
        self.adapters.clone()
    }
}
