//! Engine counters, shared between the scheduler and the handle.

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

/// Render scheduler states. Stored as a `u8` so the handle can observe
/// the live state without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Init = 0,
    Idle = 1,
    Rendering = 2,
    Degraded = 3,
    Shutdown = 4,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Init => "init",
            SchedulerState::Idle => "idle",
            SchedulerState::Rendering => "rendering",
            SchedulerState::Degraded => "degraded",
            SchedulerState::Shutdown => "shutdown",
        }
    }

    fn from_u8(v: u8) -> SchedulerState {
        match v {
            0 => SchedulerState::Init,
            1 => SchedulerState::Idle,
            2 => SchedulerState::Rendering,
            3 => SchedulerState::Degraded,
            _ => SchedulerState::Shutdown,
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineStats {
    state: AtomicU8,
    pub(crate) ticks: AtomicU64,
    pub(crate) events_ingested: AtomicU64,
    pub(crate) items_created: AtomicU64,
    pub(crate) items_merged: AtomicU64,
    pub(crate) events_rejected: AtomicU64,
    pub(crate) items_purged: AtomicU64,
    pub(crate) live_items: AtomicUsize,
    pub(crate) frames_dispatched: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time view of the whole engine, assembled by
/// [`EngineHandle::stats`](crate::EngineHandle::stats).
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub state: SchedulerState,
    pub ticks: u64,
    pub events_ingested: u64,
    pub items_created: u64,
    pub items_merged: u64,
    pub events_rejected: u64,
    pub items_purged: u64,
    pub live_items: usize,
    pub frames_dispatched: u64,
    pub frames_written: u64,
    pub clears: u64,
    pub sink_consecutive_failures: u32,
    pub queue_overflows: u64,
}

impl EngineStats {
    pub(crate) fn snapshot_base(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.state(),
            ticks: self.ticks.load(Ordering::Relaxed),
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            items_created: self.items_created.load(Ordering::Relaxed),
            items_merged: self.items_merged.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            items_purged: self.items_purged.load(Ordering::Relaxed),
            live_items: self.live_items.load(Ordering::Relaxed),
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            frames_written: 0,
            clears: 0,
            sink_consecutive_failures: 0,
            queue_overflows: 0,
        }
    }
}
