//! Priority arbitration: which item owns the display right now.
//!
//! Every tick the manager recomputes each live item's effective priority
//!
//! ```text
//! effective = (base + occurrence_escalation) * freshness_decay(age) * stale_factor
//!           + aging_bonus - shown_penalty + urgency_bonus
//! ```
//!
//! sweeps out expired items, and picks the maximum. Ties break
//! deterministically: earliest `created_at`, then lowest static source
//! rank, then dedup key — there is no randomness anywhere in selection.
//!
//! Anti-starvation: an item passed over for more than
//! `aging_threshold_ticks` gains `aging_bonus_per_tick` for every further
//! tick, without cap, so any positively weighted item is selected within a
//! bounded number of ticks unless strictly higher-priority items keep
//! arriving.
//!
//! The shown penalty is armed by the caller via
//! [`PriorityManager::apply_shown_penalty`] when an item yields the
//! display, not on every selection — the item currently on screen keeps
//! its full standing while it is up, and only pays the penalty once
//! rotation forces it to step aside. That is what stops a dominant item
//! from instantly re-winning the tick after a forced yield.

use std::collections::HashSet;

use uuid::Uuid;

use crate::content::ContentSet;
use crate::item::ContentItem;
use crate::policy::PriorityPolicy;
use crate::time::{Millis, age_millis};

/// Winner of one arbitration round, or the explicit idle signal that tells
/// the caller to fall back to its ambient view.
#[derive(Debug, Clone)]
pub enum Selection {
    Item(ContentItem),
    Idle,
}

impl Selection {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Selection::Item(item) => Some(item.id),
            Selection::Idle => None,
        }
    }
}

/// One tick's arbitration result, with sweep counters for the caller's
/// logs.
#[derive(Debug)]
pub struct SelectionOutcome {
    pub selection: Selection,
    /// Items purged by the TTL sweep this tick.
    pub purged: usize,
    /// Live items remaining after the sweep.
    pub live: usize,
}

/// Stateless arbiter over a [`ContentSet`], configured by one immutable
/// policy value.
pub struct PriorityManager {
    policy: PriorityPolicy,
}

impl PriorityManager {
    pub fn new(policy: PriorityPolicy) -> Self {
        Self { policy }
    }

    /// Run one arbitration round: sweep expiry, recompute every effective
    /// priority, pick the winner, update wait counters.
    ///
    /// `stale_sources` marks adapters outside their health window; their
    /// items decay by the policy's stale factor. `exclude` implements
    /// forced rotation: the current item sits this round out (it still
    /// ages and stays live).
    pub fn select_next(
        &self,
        set: &mut ContentSet,
        now: Millis,
        stale_sources: &HashSet<String>,
        exclude: Option<Uuid>,
    ) -> SelectionOutcome {
        let purged = set.sweep_expired(now);

        for item in set.iter_mut() {
            if item.penalty_ticks_left > 0 {
                item.penalty_ticks_left -= 1;
            }
            item.priority_effective = Self::effective(&self.policy, item, now, stale_sources);
        }

        let winner_id = set
            .iter()
            .filter(|item| Some(item.id) != exclude)
            .max_by(|a, b| {
                a.priority_effective
                    .total_cmp(&b.priority_effective)
                    // max_by keeps the later of equals, so the tie-break
                    // fields compare reversed: earlier created_at, lower
                    // rank, lower key must order greater.
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| {
                        self.policy
                            .source_rank(&b.source_id)
                            .cmp(&self.policy.source_rank(&a.source_id))
                    })
                    .then_with(|| b.dedup_key.cmp(&a.dedup_key))
            })
            .map(|item| item.id);

        let mut winner = None;
        for item in set.iter_mut() {
            if Some(item.id) == winner_id {
                item.wait_ticks = 0;
                winner = Some(item.clone());
            } else {
                item.wait_ticks = item.wait_ticks.saturating_add(1);
            }
        }

        SelectionOutcome {
            selection: match winner {
                Some(item) => Selection::Item(item),
                None => Selection::Idle,
            },
            purged,
            live: set.len(),
        }
    }

    /// Record that an item went up on the display.
    pub fn mark_shown(&self, set: &mut ContentSet, id: Uuid, now: Millis) {
        if let Some(item) = set.get_by_id_mut(id) {
            item.last_shown_at = Some(now);
        }
    }

    /// Arm the post-display penalty window on an item that just yielded
    /// the display.
    pub fn apply_shown_penalty(&self, set: &mut ContentSet, id: Uuid) {
        if let Some(item) = set.get_by_id_mut(id) {
            item.penalty_ticks_left = self.policy.shown_penalty_ticks;
        }
    }

    fn effective(
        policy: &PriorityPolicy,
        item: &ContentItem,
        now: Millis,
        stale_sources: &HashSet<String>,
    ) -> f64 {
        let decay = policy.freshness_decay(age_millis(now, item.created_at));
        let stale_factor = if stale_sources.contains(&item.source_id) {
            policy.stale_decay_factor
        } else {
            1.0
        };
        let aging_bonus = f64::from(item.wait_ticks.saturating_sub(policy.aging_threshold_ticks))
            * policy.aging_bonus_per_tick;
        let shown_penalty = if item.penalty_ticks_left > 0 {
            policy.shown_penalty
        } else {
            0.0
        };
        let urgency = if item.urgent { policy.urgency_bonus } else { 0.0 };

        (item.priority_base + item.occurrence_escalation(policy)) * decay * stale_factor
            + aging_bonus
            - shown_penalty
            + urgency
    }
}
