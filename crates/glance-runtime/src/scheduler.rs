//! The render scheduler: one cooperative, tick-driven sequence.
//!
//! Each tick does one ingest drain, one aggregation pass, one arbitration
//! round, and at most one render dispatch. Nothing downstream of the
//! ingest bus runs concurrently, so the content set never sees mid-tick
//! mutation and selection stays deterministic. Render dispatch goes
//! through the capacity-1 sink channel; if the worker is still busy with
//! the previous write the dispatch is skipped and retried next tick.
//!
//! State machine: INIT → IDLE after the first drain; IDLE ↔ RENDERING on
//! arbitration results; RENDERING → DEGRADED after the policy's run of
//! consecutive sink failures; DEGRADED → RENDERING once a recovery probe
//! write lands; anything → SHUTDOWN on cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glance_core::{
    Aggregator, Category, ContentSet, DisplayFrame, HealthRegistry, Millis, Payload,
    PriorityManager, PriorityPolicy, RawEvent, Rect, Selection, dedup_key,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::ingest::IngestBus;
use crate::sink::{DisplayCaps, SinkJob, SinkStatus};
use crate::stats::{EngineStats, SchedulerState};

/// Source id for the scheduler's own startup splash item.
const SPLASH_SOURCE: &str = "glance";

/// What is on the panel right now.
struct CurrentDisplay {
    id: Uuid,
    shown_at: Millis,
    /// Occurrence count when the frame went up; a higher count later means
    /// the payload was refreshed and the frame is dirty.
    occurrences_at_show: u32,
    /// The sink's `frames_written` count when this frame was dispatched.
    /// The frame is confirmed on the panel once the counter moves past it.
    written_baseline: u64,
    confirmed: bool,
}

pub(crate) struct Scheduler {
    policy: PriorityPolicy,
    aggregator: Aggregator,
    priority: PriorityManager,
    set: ContentSet,
    bus: IngestBus,
    health: Arc<Mutex<HealthRegistry>>,
    sink_tx: mpsc::Sender<SinkJob>,
    sink_status: Arc<SinkStatus>,
    caps: DisplayCaps,
    clock: Clock,
    stats: Arc<EngineStats>,
    shutdown: CancellationToken,
    state: SchedulerState,
    current: Option<CurrentDisplay>,
    idle_ticks: u32,
    idle_cleared: bool,
    /// Sources currently carrying an offline marker item.
    offline: HashSet<String>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        policy: PriorityPolicy,
        bus: IngestBus,
        health: Arc<Mutex<HealthRegistry>>,
        sink_tx: mpsc::Sender<SinkJob>,
        sink_status: Arc<SinkStatus>,
        caps: DisplayCaps,
        clock: Clock,
        stats: Arc<EngineStats>,
        shutdown: CancellationToken,
    ) -> Self {
        let aggregator = Aggregator::new(policy.clone());
        let priority = PriorityManager::new(policy.clone());
        stats.set_state(SchedulerState::Init);
        Self {
            policy,
            aggregator,
            priority,
            set: ContentSet::new(),
            bus,
            health,
            sink_tx,
            sink_status,
            caps,
            clock,
            stats,
            shutdown,
            state: SchedulerState::Init,
            current: None,
            idle_ticks: 0,
            idle_cleared: false,
            offline: HashSet::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.policy.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.seed_splash(self.clock.now());
        tracing::info!(
            tick_ms = self.policy.tick_interval_ms,
            panel = format!("{}x{}", self.caps.width, self.caps.height),
            "render scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => self.tick(),
            }
        }

        self.set_state(SchedulerState::Shutdown);
        tracing::info!("render scheduler stopped");
        // Dropping self closes the sink channel; the worker drains at most
        // one in-flight write, clears the panel, and releases the sink.
    }

    /// The scheduler's own one-shot startup frame: an ordinary low-weight
    /// system item with a short TTL, arbitrated like everything else.
    fn seed_splash(&mut self, now: Millis) {
        let splash = RawEvent::text(SPLASH_SOURCE, "system", "glance\nstarting...", now);
        self.aggregator.ingest_batch(&mut self.set, &[splash], now);
    }

    fn set_state(&mut self, next: SchedulerState) {
        if self.state != next {
            tracing::info!(from = self.state.as_str(), to = next.as_str(), "state");
            self.state = next;
            self.stats.set_state(next);
        }
    }

    fn tick(&mut self) {
        let now = self.clock.now();
        self.stats.add(&self.stats.ticks, 1);

        // 1. Drain and aggregate.
        let events = self.bus.drain_all();
        if self.state == SchedulerState::Init {
            self.set_state(SchedulerState::Idle);
        }
        let batch = self
            .aggregator
            .ingest_batch(&mut self.set, &events, now);
        self.stats.add(&self.stats.events_ingested, events.len() as u64);
        self.stats.add(&self.stats.items_created, batch.created as u64);
        self.stats.add(&self.stats.items_merged, batch.merged as u64);
        self.stats
            .add(&self.stats.events_rejected, batch.rejected_count() as u64);
        if !batch.rejected.is_empty()
            && let Ok(mut health) = self.health.lock()
        {
            for (source, err) in &batch.rejected {
                tracing::warn!(source = %source, error = %err, "dropped malformed event");
                health.record_error(source, &err.to_string());
            }
        }

        let stale = self
            .health
            .lock()
            .map(|h| h.stale_sources(now, self.policy.stale_after_ms))
            .unwrap_or_default();
        self.sync_offline_markers(now, &stale);

        // 2. Sink health gate.
        let failures = self.sink_status.consecutive_failures();
        match self.state {
            SchedulerState::Degraded => {
                if failures == 0 {
                    tracing::info!("display sink recovered");
                    // Forget the on-panel frame so the winner re-renders.
                    self.current = None;
                    self.set_state(SchedulerState::Rendering);
                } else {
                    self.degraded_tick(now);
                    return;
                }
            }
            _ if failures >= self.policy.sink_failure_threshold => {
                tracing::warn!(failures, "display sink failing, entering degraded mode");
                self.current = None;
                self.set_state(SchedulerState::Degraded);
                self.degraded_tick(now);
                return;
            }
            _ => {}
        }

        // 2b. Below-threshold write failures: the worker drops a failed job
        // after its backoff, so the current frame must be re-dispatched
        // here until its write is confirmed.
        self.confirm_or_redispatch(now);

        // 3. Arbitrate, with forced rotation when the current slot is
        // consumed.
        let force_rotate = self
            .current
            .as_ref()
            .map(|cur| now.saturating_sub(cur.shown_at) >= self.display_duration(cur.id))
            .unwrap_or(false);
        let exclude = if force_rotate {
            self.current.as_ref().map(|cur| cur.id)
        } else {
            None
        };

        let outcome = self.priority.select_next(&mut self.set, now, &stale, exclude);
        self.stats.add(&self.stats.items_purged, outcome.purged as u64);
        self.stats
            .live_items
            .store(outcome.live, std::sync::atomic::Ordering::Relaxed);

        if force_rotate
            && matches!(outcome.selection, Selection::Idle)
            && let Some(cur) = &mut self.current
            && self.set.get_by_id(cur.id).is_some()
        {
            // Nothing else to rotate to; the current item keeps the panel
            // for a fresh slot.
            cur.shown_at = now;
            return;
        }

        // 4. Dispatch.
        match outcome.selection {
            Selection::Idle => {
                self.current = None;
                if self.state == SchedulerState::Rendering {
                    self.set_state(SchedulerState::Idle);
                }
                self.idle_ticks = self.idle_ticks.saturating_add(1);
                // The worker may be mid-write or backing off at the clear
                // tick; keep offering the clear until it is accepted.
                if self.idle_ticks >= self.policy.idle_clear_after_ticks
                    && !self.idle_cleared
                    && self.sink_tx.try_send(SinkJob::Clear).is_ok()
                {
                    self.idle_cleared = true;
                }
            }
            Selection::Item(winner) => {
                self.idle_ticks = 0;
                self.idle_cleared = false;
                let same = self.current.as_ref().map(|c| c.id) == Some(winner.id);
                if same {
                    self.refresh_current(&winner, now);
                } else {
                    self.transition_to(winner, now);
                }
            }
        }
    }

    /// Re-render the on-panel item only if its payload was refreshed by a
    /// merge since it went up; an unchanged payload means no write at all.
    fn refresh_current(&mut self, winner: &glance_core::ContentItem, now: Millis) {
        let Some(cur) = &mut self.current else {
            return;
        };
        if winner.occurrence_count <= cur.occurrences_at_show {
            return;
        }
        let frame = DisplayFrame::for_item(
            winner.id,
            winner.payload.clone(),
            vec![Rect::full(self.caps.width, self.caps.height)],
            now,
        );
        // Baseline before the hand-off: the worker may write immediately.
        let baseline = self.sink_status.frames_written();
        if self.sink_tx.try_send(SinkJob::Frame(frame)).is_ok() {
            cur.occurrences_at_show = winner.occurrence_count;
            cur.written_baseline = baseline;
            cur.confirmed = false;
            self.stats.add(&self.stats.frames_dispatched, 1);
        }
    }

    /// Watch for the current frame's write landing, and re-dispatch it
    /// after a failed write. The worker's backoff paces the retries; once
    /// `consecutive_failures` reaches the policy threshold the degraded
    /// gate takes over instead.
    fn confirm_or_redispatch(&mut self, now: Millis) {
        let written = self.sink_status.frames_written();
        let failures = self.sink_status.consecutive_failures();
        let (id, baseline) = match &self.current {
            Some(cur) if !cur.confirmed => (cur.id, cur.written_baseline),
            _ => return,
        };
        if written > baseline {
            if let Some(cur) = &mut self.current {
                cur.confirmed = true;
            }
            return;
        }
        if failures == 0 {
            // Still queued or in flight.
            return;
        }
        let Some(item) = self.set.get_by_id(id) else {
            return;
        };
        let frame = DisplayFrame::for_item(
            item.id,
            item.payload.clone(),
            vec![Rect::full(self.caps.width, self.caps.height)],
            now,
        );
        if self.sink_tx.try_send(SinkJob::Frame(frame)).is_ok() {
            tracing::debug!(source = %item.source_id, "re-dispatching unconfirmed frame");
            self.stats.add(&self.stats.frames_dispatched, 1);
        }
    }

    /// Keep one system-category offline marker live per stale source, and
    /// drop it again as soon as the source produces.
    fn sync_offline_markers(&mut self, now: Millis, stale: &HashSet<String>) {
        for source in stale {
            if self.offline.insert(source.clone()) {
                tracing::warn!(source = %source, "source offline");
            }
            let text = format!("{source} offline");
            let key = dedup_key(SPLASH_SOURCE, Category::System, &Payload::Text(text.clone()));
            let live = self
                .set
                .get_by_key(&key)
                .is_some_and(|item| !item.is_expired(now));
            if !live {
                let marker = RawEvent::text(SPLASH_SOURCE, "system", &text, now);
                self.aggregator.ingest_batch(&mut self.set, &[marker], now);
            }
        }

        let recovered: Vec<String> = self
            .offline
            .iter()
            .filter(|source| !stale.contains(source.as_str()))
            .cloned()
            .collect();
        for source in recovered {
            self.offline.remove(&source);
            tracing::info!(source = %source, "source back online");
            let key = dedup_key(
                SPLASH_SOURCE,
                Category::System,
                &Payload::Text(format!("{source} offline")),
            );
            if let Some(item) = self.set.get_by_key(&key) {
                let id = item.id;
                self.set.remove_by_id(id);
                if self.current.as_ref().map(|cur| cur.id) == Some(id) {
                    self.current = None;
                }
            }
        }
    }

    /// Swap the panel to a new winner. Commits bookkeeping only if the
    /// frame was actually handed to the sink worker; a busy worker means
    /// we retry the same transition next tick.
    fn transition_to(&mut self, winner: glance_core::ContentItem, now: Millis) {
        let frame = DisplayFrame::for_item(
            winner.id,
            winner.payload.clone(),
            vec![Rect::full(self.caps.width, self.caps.height)],
            now,
        );
        // Baseline before the hand-off: the worker may write immediately.
        let baseline = self.sink_status.frames_written();
        if self.sink_tx.try_send(SinkJob::Frame(frame)).is_err() {
            tracing::trace!("sink busy, deferring transition");
            return;
        }

        if let Some(old) = self.current.take() {
            self.priority.apply_shown_penalty(&mut self.set, old.id);
            // Slot consumed with no further occurrences → end of life.
            if now.saturating_sub(old.shown_at) >= self.display_duration(old.id) {
                self.set.retire_if_unchanged(old.id, old.occurrences_at_show);
            }
        }

        self.priority.mark_shown(&mut self.set, winner.id, now);
        tracing::debug!(
            source = %winner.source_id,
            category = winner.category.as_str(),
            occurrences = winner.occurrence_count,
            "display transition"
        );
        self.current = Some(CurrentDisplay {
            id: winner.id,
            shown_at: now,
            occurrences_at_show: winner.occurrence_count,
            written_baseline: baseline,
            confirmed: false,
        });
        self.stats.add(&self.stats.frames_dispatched, 1);
        self.set_state(SchedulerState::Rendering);
    }

    /// Degraded mode: keep ingesting and expiring, and keep offering the
    /// fallback indicator as a recovery probe. The worker's backoff paces
    /// the probes; a full channel just means the last probe is still
    /// pending.
    fn degraded_tick(&mut self, now: Millis) {
        let purged = self.set.sweep_expired(now);
        self.stats.add(&self.stats.items_purged, purged as u64);
        self.stats
            .live_items
            .store(self.set.len(), std::sync::atomic::Ordering::Relaxed);

        let probe = DisplayFrame::fallback(
            vec![Rect::full(self.caps.width, self.caps.height)],
            now,
        );
        let _ = self.sink_tx.try_send(SinkJob::Frame(probe));
    }

    fn display_duration(&self, id: Uuid) -> Millis {
        self.set
            .get_by_id(id)
            .map(|item| item.display_duration_hint)
            .unwrap_or(self.policy.display_duration_ms)
    }
}
