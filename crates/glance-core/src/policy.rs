//! Immutable scheduling policy.
//!
//! One [`PriorityPolicy`] value is constructed at startup (usually
//! deserialized by an external config loader), validated once, and passed
//! by value into the aggregator and priority manager. Nothing mutates it at
//! runtime; there is no global settings object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::SOURCE_RANK_DEFAULT;
use crate::error::PolicyError;
use crate::event::Category;
use crate::time::Millis;

/// Scheduling knobs for the whole pipeline. All durations in milliseconds,
/// all per-tick quantities in ticks of `tick_interval_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityPolicy {
    /// Static base weight per category. Must cover every category.
    pub base_weights: HashMap<Category, f64>,
    /// Default time-to-live for a new item.
    pub ttl_default_ms: Millis,
    /// Per-category TTL overrides (e.g. time-of-day content goes stale in
    /// a minute or two; a notification can linger).
    pub ttl_overrides_ms: HashMap<Category, Millis>,
    /// How long a selected item holds the display before forced rotation.
    pub display_duration_ms: Millis,

    /// Freshness half-life: effective weight halves every this many ms.
    pub decay_half_life_ms: Millis,
    /// Ticks an item may be passed over before aging kicks in.
    pub aging_threshold_ticks: u32,
    /// Bonus added per tick past the threshold. Grows without cap, so any
    /// positively weighted item is eventually selected.
    pub aging_bonus_per_tick: f64,
    /// Subtracted from a just-shown item's score while its penalty window
    /// is open, so a rotation-forced yield is not immediately undone.
    pub shown_penalty: f64,
    /// Length of the penalty window, in ticks.
    pub shown_penalty_ticks: u32,
    /// Added to events the adapter flagged urgent.
    pub urgency_bonus: f64,
    /// Base-weight escalation per repeated occurrence of the same item.
    pub occurrence_escalation: f64,
    /// Occurrences past this count stop escalating.
    pub occurrence_escalation_cap: u32,

    /// Static tie-break rank per source; lower wins. Sources not listed
    /// rank last.
    pub source_ranks: HashMap<String, u32>,

    /// Bounded ingest buffer capacity, per adapter.
    pub queue_capacity: usize,
    /// Scheduler tick interval.
    pub tick_interval_ms: Millis,

    /// An adapter with no event for this long is stale.
    pub stale_after_ms: Millis,
    /// Multiplier applied to items from stale adapters.
    pub stale_decay_factor: f64,

    /// Consecutive sink failures before the scheduler goes DEGRADED.
    pub sink_failure_threshold: u32,
    /// Per-write timeout; a timeout counts as a failure.
    pub sink_write_timeout_ms: Millis,
    /// Retry/recovery-probe backoff bounds.
    pub sink_backoff_base_ms: Millis,
    pub sink_backoff_max_ms: Millis,

    /// Consecutive idle ticks before the display is cleared.
    pub idle_clear_after_ticks: u32,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        let base_weights = HashMap::from([
            (Category::Notification, 5.0),
            (Category::AssistantResponse, 4.0),
            (Category::TimeOfDay, 3.0),
            (Category::AmbientStatus, 2.0),
            (Category::System, 1.0),
        ]);
        let ttl_overrides_ms = HashMap::from([
            (Category::TimeOfDay, 120_000),
            (Category::System, 10_000),
        ]);
        Self {
            base_weights,
            ttl_default_ms: 300_000,
            ttl_overrides_ms,
            display_duration_ms: 5_000,
            decay_half_life_ms: 120_000,
            aging_threshold_ticks: 10,
            aging_bonus_per_tick: 0.5,
            shown_penalty: 2.0,
            shown_penalty_ticks: 4,
            urgency_bonus: 10.0,
            occurrence_escalation: 0.25,
            occurrence_escalation_cap: 8,
            source_ranks: HashMap::new(),
            queue_capacity: 32,
            tick_interval_ms: 1_000,
            stale_after_ms: 90_000,
            stale_decay_factor: 0.5,
            sink_failure_threshold: 3,
            sink_write_timeout_ms: 2_000,
            sink_backoff_base_ms: 500,
            sink_backoff_max_ms: 8_000,
            idle_clear_after_ticks: 5,
        }
    }
}

impl PriorityPolicy {
    /// Check the policy once, before the engine starts. Any failure here is
    /// fatal; there is no partially valid policy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for cat in Category::ALL {
            match self.base_weights.get(&cat) {
                None => return Err(PolicyError::MissingWeight(cat)),
                Some(w) if *w <= 0.0 || !w.is_finite() => {
                    return Err(PolicyError::OutOfRange {
                        field: "base_weights",
                        detail: format!("weight for '{}' must be finite and > 0", cat.as_str()),
                    });
                }
                Some(_) => {}
            }
        }
        if self.ttl_default_ms == 0 {
            return Err(PolicyError::NonPositive("ttl_default_ms"));
        }
        if let Some((cat, _)) = self.ttl_overrides_ms.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(PolicyError::OutOfRange {
                field: "ttl_overrides_ms",
                detail: format!("TTL for '{}' must be > 0", cat.as_str()),
            });
        }
        if self.display_duration_ms == 0 {
            return Err(PolicyError::NonPositive("display_duration_ms"));
        }
        if self.decay_half_life_ms == 0 {
            return Err(PolicyError::NonPositive("decay_half_life_ms"));
        }
        if self.aging_bonus_per_tick <= 0.0 || !self.aging_bonus_per_tick.is_finite() {
            return Err(PolicyError::NonPositive("aging_bonus_per_tick"));
        }
        if self.shown_penalty < 0.0 || !self.shown_penalty.is_finite() {
            return Err(PolicyError::OutOfRange {
                field: "shown_penalty",
                detail: "must be finite and >= 0".into(),
            });
        }
        if self.urgency_bonus < 0.0 || !self.urgency_bonus.is_finite() {
            return Err(PolicyError::OutOfRange {
                field: "urgency_bonus",
                detail: "must be finite and >= 0".into(),
            });
        }
        if self.occurrence_escalation < 0.0 || !self.occurrence_escalation.is_finite() {
            return Err(PolicyError::OutOfRange {
                field: "occurrence_escalation",
                detail: "must be finite and >= 0".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(PolicyError::NonPositive("queue_capacity"));
        }
        if self.tick_interval_ms == 0 {
            return Err(PolicyError::NonPositive("tick_interval_ms"));
        }
        if self.stale_after_ms == 0 {
            return Err(PolicyError::NonPositive("stale_after_ms"));
        }
        if self.stale_decay_factor <= 0.0 || self.stale_decay_factor > 1.0 {
            return Err(PolicyError::OutOfRange {
                field: "stale_decay_factor",
                detail: "must be in (0, 1]".into(),
            });
        }
        if self.sink_failure_threshold == 0 {
            return Err(PolicyError::NonPositive("sink_failure_threshold"));
        }
        if self.sink_write_timeout_ms == 0 {
            return Err(PolicyError::NonPositive("sink_write_timeout_ms"));
        }
        if self.sink_backoff_base_ms == 0 {
            return Err(PolicyError::NonPositive("sink_backoff_base_ms"));
        }
        if self.sink_backoff_max_ms < self.sink_backoff_base_ms {
            return Err(PolicyError::OutOfRange {
                field: "sink_backoff_max_ms",
                detail: "must be >= sink_backoff_base_ms".into(),
            });
        }
        Ok(())
    }

    /// Base weight for a category. Total after [`validate`](Self::validate).
    pub fn base_weight(&self, category: Category) -> f64 {
        self.base_weights.get(&category).copied().unwrap_or(0.0)
    }

    /// TTL for a category: override if present, default otherwise.
    pub fn ttl_for(&self, category: Category) -> Millis {
        self.ttl_overrides_ms
            .get(&category)
            .copied()
            .unwrap_or(self.ttl_default_ms)
    }

    /// Static tie-break rank for a source. Lower wins; unlisted sources
    /// rank last.
    pub fn source_rank(&self, source_id: &str) -> u32 {
        self.source_ranks
            .get(source_id)
            .copied()
            .unwrap_or(SOURCE_RANK_DEFAULT)
    }

    /// Freshness multiplier for an item of the given age:
    /// `0.5 ^ (age / half_life)`.
    pub fn freshness_decay(&self, age_ms: Millis) -> f64 {
        0.5f64.powf(age_ms as f64 / self.decay_half_life_ms as f64)
    }
}
