//! Bounded per-adapter ingest buffers.
//!
//! This is the single thread-safe boundary between adapter producers and
//! the tick-driven consumer. `publish` never blocks a producer: on a full
//! buffer the oldest event is dropped and counted. `drain_all` empties
//! every buffer once per tick, preserving per-adapter arrival order.
//!
//! Plain `std::sync::Mutex` per buffer — the critical sections are a push
//! or a swap, and adapters touch only their own slot, so contention is
//! between exactly one producer and the scheduler.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use glance_core::RawEvent;

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    /// Accepted, but the oldest buffered event was dropped to make room.
    DroppedOldest,
    /// The source id was never registered; event discarded.
    UnknownSource,
}

#[derive(Debug)]
struct QueueSlot {
    source_id: String,
    buf: Mutex<VecDeque<RawEvent>>,
    overflows: AtomicU64,
    published: AtomicU64,
}

/// Shared, cheaply clonable bus over all registered adapters.
#[derive(Debug, Clone)]
pub struct IngestBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    slots: Vec<QueueSlot>,
    index: HashMap<String, usize>,
    capacity: usize,
}

impl IngestBus {
    pub fn new(source_ids: &[String], capacity: usize) -> Self {
        let slots = source_ids
            .iter()
            .map(|id| QueueSlot {
                source_id: id.clone(),
                buf: Mutex::new(VecDeque::with_capacity(capacity)),
                overflows: AtomicU64::new(0),
                published: AtomicU64::new(0),
            })
            .collect();
        let index = source_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self {
            inner: Arc::new(BusInner {
                slots,
                index,
                capacity,
            }),
        }
    }

    /// Non-blocking hand-off from an adapter. Drop-oldest on overflow.
    pub fn publish(&self, event: RawEvent) -> PublishOutcome {
        let Some(&idx) = self.inner.index.get(&event.source_id) else {
            return PublishOutcome::UnknownSource;
        };
        let slot = &self.inner.slots[idx];
        slot.published.fetch_add(1, Ordering::Relaxed);

        let mut buf = match slot.buf.lock() {
            Ok(buf) => buf,
            // A poisoned buffer only means a producer panicked mid-push;
            // the queue itself is still a valid VecDeque.
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut outcome = PublishOutcome::Accepted;
        if buf.len() >= self.inner.capacity {
            buf.pop_front();
            slot.overflows.fetch_add(1, Ordering::Relaxed);
            outcome = PublishOutcome::DroppedOldest;
        }
        buf.push_back(event);
        outcome
    }

    /// Take everything, per-adapter arrival order preserved. Called once
    /// per tick by the scheduler.
    pub fn drain_all(&self) -> Vec<RawEvent> {
        let mut out = Vec::new();
        for slot in &self.inner.slots {
            let mut buf = match slot.buf.lock() {
                Ok(buf) => buf,
                Err(poisoned) => poisoned.into_inner(),
            };
            out.extend(buf.drain(..));
        }
        out
    }

    pub fn overflow_count(&self, source_id: &str) -> u64 {
        self.inner
            .index
            .get(source_id)
            .map(|&i| self.inner.slots[i].overflows.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_overflows(&self) -> u64 {
        self.inner
            .slots
            .iter()
            .map(|s| s.overflows.load(Ordering::Relaxed))
            .sum()
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.slots.iter().map(|s| s.source_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(capacity: usize) -> IngestBus {
        IngestBus::new(&["phone".to_string(), "web".to_string()], capacity)
    }

    fn ev(source: &str, text: &str) -> RawEvent {
        RawEvent::text(source, "notification", text, 0)
    }

    #[test]
    fn test_publish_and_drain_in_order() {
        let bus = bus(8);
        bus.publish(ev("phone", "one"));
        bus.publish(ev("phone", "two"));
        bus.publish(ev("web", "three"));

        let drained = bus.drain_all();
        assert_eq!(drained.len(), 3);
        // Per-adapter order: phone's events before web's, in arrival order.
        let texts: Vec<&str> = drained
            .iter()
            .map(|e| match &e.payload {
                glance_core::Payload::Text(t) => t.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);

        assert!(bus.drain_all().is_empty(), "drain clears the buffers");
    }

    #[test]
    fn test_overflow_drops_oldest_never_blocks() {
        let bus = bus(3);
        for i in 0..5 {
            let outcome = bus.publish(ev("phone", &format!("msg-{i}")));
            if i < 3 {
                assert_eq!(outcome, PublishOutcome::Accepted);
            } else {
                assert_eq!(outcome, PublishOutcome::DroppedOldest);
            }
        }
        assert_eq!(bus.overflow_count("phone"), 2);

        let drained = bus.drain_all();
        assert_eq!(drained.len(), 3, "capacity bounds the buffer");
        // Oldest two (msg-0, msg-1) were dropped.
        match &drained[0].payload {
            glance_core::Payload::Text(t) => assert_eq!(t, "msg-2"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_overflow_isolated_per_adapter() {
        let bus = bus(2);
        for i in 0..10 {
            bus.publish(ev("phone", &format!("flood-{i}")));
        }
        bus.publish(ev("web", "calm"));

        assert_eq!(bus.overflow_count("phone"), 8);
        assert_eq!(bus.overflow_count("web"), 0);
        assert_eq!(bus.drain_all().len(), 3);
    }

    #[test]
    fn test_unknown_source_discarded() {
        let bus = bus(2);
        assert_eq!(
            bus.publish(ev("nobody", "lost")),
            PublishOutcome::UnknownSource
        );
        assert!(bus.drain_all().is_empty());
    }
}
