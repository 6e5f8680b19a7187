//! Canonical content records.
//!
//! A [`ContentItem`] is the deduplicated unit the priority manager
//! arbitrates over. It is created on the first unseen event for a dedup
//! key, refreshed in place when the same event repeats, and dies on TTL
//! expiry or after its display slot is consumed with no further
//! occurrences.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{Category, Payload, RawEvent, dedup_key};
use crate::policy::PriorityPolicy;
use crate::time::Millis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub source_id: String,
    pub category: Category,
    pub payload: Payload,
    pub dedup_key: String,
    /// Static weight from the policy's category table, fixed at creation.
    pub priority_base: f64,
    /// Recomputed every tick by the priority manager. Never read across a
    /// tick boundary.
    pub priority_effective: f64,
    pub urgent: bool,
    pub created_at: Millis,
    pub ttl_expiry: Millis,
    pub display_duration_hint: Millis,
    /// Ticks this item has been passed over since it was last selected.
    pub wait_ticks: u32,
    /// How many raw events collapsed into this item.
    pub occurrence_count: u32,
    /// Ticks remaining of the post-selection penalty window.
    pub penalty_ticks_left: u32,
    pub last_shown_at: Option<Millis>,
}

impl ContentItem {
    /// Build a fresh item from a validated event. `category` must be the
    /// result of validating `event`.
    pub fn from_event(
        event: &RawEvent,
        category: Category,
        policy: &PriorityPolicy,
        now: Millis,
    ) -> Self {
        let key = dedup_key(&event.source_id, category, &event.payload);
        Self {
            id: Uuid::new_v4(),
            source_id: event.source_id.clone(),
            category,
            payload: event.payload.clone(),
            dedup_key: key,
            priority_base: policy.base_weight(category),
            priority_effective: 0.0,
            urgent: event.urgent,
            created_at: now,
            ttl_expiry: now + policy.ttl_for(category),
            display_duration_hint: policy.display_duration_ms,
            wait_ticks: 0,
            occurrence_count: 1,
            penalty_ticks_left: 0,
            last_shown_at: None,
        }
    }

    /// Fold a repeat of the same event into this item: refresh freshness
    /// and TTL, bump the occurrence count, keep the urgency flag sticky.
    /// The item's identity (`id`, `dedup_key`) is unchanged.
    pub fn merge_event(&mut self, event: &RawEvent, policy: &PriorityPolicy, now: Millis) {
        self.created_at = now;
        self.ttl_expiry = now + policy.ttl_for(self.category);
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        self.urgent |= event.urgent;
        // Adapters may rephrase whitespace/case without changing identity;
        // keep the latest rendition.
        self.payload = event.payload.clone();
    }

    pub fn is_expired(&self, now: Millis) -> bool {
        now >= self.ttl_expiry
    }

    /// Bounded escalation for repeated occurrences: each repeat past the
    /// first adds `occurrence_escalation`, up to the policy cap.
    pub fn occurrence_escalation(&self, policy: &PriorityPolicy) -> f64 {
        let repeats = self.occurrence_count.saturating_sub(1);
        f64::from(repeats.min(policy.occurrence_escalation_cap)) * policy.occurrence_escalation
    }
}
