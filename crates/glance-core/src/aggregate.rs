//! Batch aggregation: raw events in, deduplicated content items out.
//!
//! One batch per tick. Each event is validated, keyed, and either merged
//! into the live item with the same dedup key or inserted as a new item.
//! A malformed event is dropped and reported per source; it never aborts
//! the rest of the batch, so one misbehaving adapter cannot hold back the
//! others.

use crate::content::ContentSet;
use crate::error::ValidationError;
use crate::event::{RawEvent, dedup_key, validate_event};
use crate::item::ContentItem;
use crate::policy::PriorityPolicy;
use crate::time::Millis;

/// Outcome of one `ingest_batch` call.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub created: usize,
    pub merged: usize,
    /// Rejected events with their source, for health accounting and logs.
    pub rejected: Vec<(String, ValidationError)>,
}

impl BatchOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Stateless batch processor over a [`ContentSet`], configured by one
/// immutable policy value.
pub struct Aggregator {
    policy: PriorityPolicy,
}

impl Aggregator {
    pub fn new(policy: PriorityPolicy) -> Self {
        Self { policy }
    }

    /// Normalize one tick's drained events into the live set, in arrival
    /// order. Later repeats of a key merge into the item created or
    /// refreshed earlier in the same batch.
    pub fn ingest_batch(
        &self,
        set: &mut ContentSet,
        events: &[RawEvent],
        now: Millis,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for event in events {
            let category = match validate_event(event) {
                Ok(category) => category,
                Err(err) => {
                    outcome.rejected.push((event.source_id.clone(), err));
                    continue;
                }
            };

            let key = dedup_key(&event.source_id, category, &event.payload);
            match set.get_by_key_mut(&key) {
                Some(live) if !live.is_expired(now) => {
                    live.merge_event(event, &self.policy, now);
                    outcome.merged += 1;
                }
                _ => {
                    // Expired leftovers under this key are replaced outright;
                    // the sweep would have removed them this tick anyway.
                    set.insert(ContentItem::from_event(event, category, &self.policy, now));
                    outcome.created += 1;
                }
            }
        }

        outcome
    }
}
