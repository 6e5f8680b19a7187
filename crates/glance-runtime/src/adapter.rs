//! Source adapter boundary.
//!
//! Each adapter — phone link, web poller, assistant client, future
//! sensors — is one capability object behind [`SourceAdapter`], owning its
//! own production loop and whatever network/radio I/O that entails. It
//! hands events to the core through an [`AdapterContext`] and can never
//! stall the pipeline: publish is non-blocking, and a slow or dead adapter
//! degrades only its own freshness.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use glance_core::{HealthRegistry, RawEvent};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::ingest::{IngestBus, PublishOutcome};

/// Boxed adapter future, so heterogeneous adapters fit one `Vec`.
pub type AdapterFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Capability contract for an input source. Implementations run their own
/// loop inside `run` and must return promptly once
/// [`AdapterContext::shutdown`] is cancelled.
pub trait SourceAdapter: Send + 'static {
    /// Stable identity; also the key for queue, health, and tie-break
    /// rank lookups.
    fn source_id(&self) -> &str;

    /// The adapter's production loop. Connect, produce events via
    /// `ctx.publish`, report health via `ctx`, and exit on shutdown.
    fn run(self: Box<Self>, ctx: AdapterContext) -> AdapterFuture;
}

/// Everything an adapter may touch: its queue slot, its health record,
/// and the shutdown signal.
#[derive(Clone)]
pub struct AdapterContext {
    source_id: String,
    bus: IngestBus,
    health: Arc<Mutex<HealthRegistry>>,
    clock: Clock,
    shutdown: CancellationToken,
}

impl AdapterContext {
    pub(crate) fn new(
        source_id: String,
        bus: IngestBus,
        health: Arc<Mutex<HealthRegistry>>,
        clock: Clock,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source_id,
            bus,
            health,
            clock,
            shutdown,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Non-blocking hand-off into the ingest bus. Records the event for
    /// health/staleness and logs overflows; the adapter never waits.
    pub fn publish(&self, event: RawEvent) -> PublishOutcome {
        let outcome = self.bus.publish(event);
        match outcome {
            PublishOutcome::Accepted | PublishOutcome::DroppedOldest => {
                if let Ok(mut health) = self.health.lock() {
                    health.record_event(&self.source_id, self.clock.now());
                }
                if outcome == PublishOutcome::DroppedOldest {
                    tracing::debug!(
                        source = %self.source_id,
                        "ingest buffer full, dropped oldest event"
                    );
                }
            }
            PublishOutcome::UnknownSource => {
                tracing::warn!(
                    source = %self.source_id,
                    "publish from unregistered source discarded"
                );
            }
        }
        outcome
    }

    /// Report transport state; reflected in the health registry only.
    pub fn mark_connected(&self, connected: bool) {
        if let Ok(mut health) = self.health.lock() {
            health.mark_connected(&self.source_id, connected);
        }
    }

    /// Report a transport/parse error. Reconnect and backoff remain the
    /// adapter's own business.
    pub fn report_error(&self, error: &str) {
        tracing::debug!(source = %self.source_id, error, "adapter error");
        if let Ok(mut health) = self.health.lock() {
            health.record_error(&self.source_id, error);
        }
    }

    /// Cooperative shutdown signal for the adapter's loop.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn now(&self) -> glance_core::Millis {
        self.clock.now()
    }
}
