//! Engine assembly: wires adapters, bus, scheduler, and sink worker into
//! a running pipeline and hands back a control handle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use glance_core::{HealthRegistry, PriorityPolicy};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterContext, SourceAdapter};
use crate::clock::Clock;
use crate::error::StartError;
use crate::ingest::IngestBus;
use crate::scheduler::Scheduler;
use crate::sink::{DisplaySink, SinkStatus, run_sink_worker};
use crate::stats::{EngineStats, StatsSnapshot};

/// Validate, wire, and start the whole pipeline.
///
/// Fatal errors happen only here; once this returns a handle, adapter
/// failures degrade freshness and sink failures degrade rendering, but
/// the engine keeps running until [`EngineHandle::stop`].
pub async fn start<S: DisplaySink>(
    adapters: Vec<Box<dyn SourceAdapter>>,
    sink: S,
    policy: PriorityPolicy,
) -> Result<EngineHandle, StartError> {
    policy.validate()?;

    let mut seen = HashSet::new();
    let source_ids: Vec<String> = adapters
        .iter()
        .map(|a| a.source_id().to_string())
        .collect();
    for id in &source_ids {
        if !seen.insert(id.clone()) {
            return Err(StartError::DuplicateSource(id.clone()));
        }
    }

    let clock = Clock::anchor();
    let now = clock.now();
    let bus = IngestBus::new(&source_ids, policy.queue_capacity);
    let mut registry = HealthRegistry::new();
    for id in &source_ids {
        registry.register(id, now);
    }
    let health = Arc::new(Mutex::new(registry));

    let caps = sink.capabilities();
    let sink_status = Arc::new(SinkStatus::default());
    let stats = Arc::new(EngineStats::new());
    let shutdown = CancellationToken::new();
    let (sink_tx, sink_rx) = mpsc::channel(1);

    let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(adapters.len() + 2);

    tasks.push(tokio::spawn(run_sink_worker(
        sink,
        sink_rx,
        Arc::clone(&sink_status),
        policy.clone(),
        shutdown.child_token(),
    )));

    for adapter in adapters {
        let ctx = AdapterContext::new(
            adapter.source_id().to_string(),
            bus.clone(),
            Arc::clone(&health),
            clock.clone(),
            shutdown.child_token(),
        );
        tracing::info!(source = ctx.source_id(), "adapter started");
        tasks.push(tokio::spawn(adapter.run(ctx)));
    }

    let scheduler = Scheduler::new(
        policy,
        bus.clone(),
        Arc::clone(&health),
        sink_tx,
        Arc::clone(&sink_status),
        caps,
        clock,
        Arc::clone(&stats),
        shutdown.child_token(),
    );
    tasks.push(tokio::spawn(scheduler.run()));

    Ok(EngineHandle {
        shutdown,
        tasks,
        stats,
        bus,
        sink_status,
        health,
    })
}

/// Owner's view of a running engine: observe it, then stop it.
#[derive(Debug)]
pub struct EngineHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    stats: Arc<EngineStats>,
    bus: IngestBus,
    sink_status: Arc<SinkStatus>,
    health: Arc<Mutex<HealthRegistry>>,
}

impl EngineHandle {
    /// Graceful shutdown: cancel everything, then wait for the adapters,
    /// scheduler, and sink worker (which clears the panel) to finish.
    pub async fn stop(self) {
        tracing::info!("engine stopping");
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                tracing::warn!(error = %e, "engine task ended abnormally");
            }
        }
        tracing::info!("engine stopped");
    }

    /// Point-in-time counters across the scheduler, sink, and ingest bus.
    pub fn stats(&self) -> StatsSnapshot {
        let mut snap = self.stats.snapshot_base();
        snap.frames_written = self.sink_status.frames_written();
        snap.clears = self.sink_status.clears();
        snap.sink_consecutive_failures = self.sink_status.consecutive_failures();
        snap.queue_overflows = self.bus.total_overflows();
        snap
    }

    /// Per-source health records, cloned out of the registry.
    pub fn health_snapshot(&self) -> std::collections::HashMap<String, glance_core::AdapterState> {
        self.health
            .lock()
            .map(|h| h.snapshot())
            .unwrap_or_default()
    }
}
