//! Display sink boundary and the serialized write worker.
//!
//! The sink (SPI/I2C panel driver, an emulator, a test double) is owned by
//! one worker task fed through a capacity-1 channel: at most one write is
//! ever in flight, and the tick loop never blocks on hardware. A write
//! timeout counts as a failure. After a failure the worker sleeps a
//! jittered exponential backoff before taking the next job, which paces
//! both retries and recovery probes against a struggling panel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use glance_core::{DisplayFrame, PriorityPolicy};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;

/// Physical capabilities reported by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayCaps {
    pub width: u16,
    pub height: u16,
    /// Bits per pixel; 1 for the monochrome panels this targets.
    pub color_depth: u8,
}

/// Capability contract for the physical output device.
///
/// Futures must be `Send` because the worker task holding the sink is
/// spawned onto the runtime.
pub trait DisplaySink: Send + 'static {
    fn capabilities(&self) -> DisplayCaps;

    fn write_frame(
        &mut self,
        frame: &DisplayFrame,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn clear(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// One unit of work for the sink worker.
#[derive(Debug)]
pub(crate) enum SinkJob {
    Frame(DisplayFrame),
    Clear,
}

/// Shared sink counters the scheduler reads every tick.
#[derive(Debug, Default)]
pub struct SinkStatus {
    consecutive_failures: AtomicU32,
    frames_written: AtomicU64,
    clears: AtomicU64,
}

impl SinkStatus {
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    fn record_success(&self, was_clear: bool) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if was_clear {
            self.clears.fetch_add(1, Ordering::Relaxed);
        } else {
            self.frames_written.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Jittered exponential backoff for the `n`th consecutive failure.
pub(crate) fn backoff_delay(n: u32, policy: &PriorityPolicy, rng: &mut SmallRng) -> Duration {
    let exp = n.saturating_sub(1).min(16);
    let base = policy
        .sink_backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(policy.sink_backoff_max_ms);
    let jitter = rng.random_range(0..=policy.sink_backoff_base_ms / 2);
    Duration::from_millis(base + jitter)
}

/// The worker loop. An accepted job always runs to completion (bounded by
/// the write timeout); cancellation is observed only between jobs, so
/// shutdown drains at most the one in-flight write. On exit the panel is
/// cleared and the sink released.
pub(crate) async fn run_sink_worker<S: DisplaySink>(
    mut sink: S,
    mut jobs: mpsc::Receiver<SinkJob>,
    status: Arc<SinkStatus>,
    policy: PriorityPolicy,
    shutdown: CancellationToken,
) {
    let mut rng = SmallRng::from_os_rng();

    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        if !execute(&mut sink, &job, &status, &policy).await {
            let failures = status.consecutive_failures();
            let delay = backoff_delay(failures, &policy, &mut rng);
            tracing::warn!(
                failures,
                delay_ms = delay.as_millis() as u64,
                "display write failed, backing off"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    // Drain at most one queued frame, then release the panel.
    if let Ok(job) = jobs.try_recv() {
        let _ = execute(&mut sink, &job, &status, &policy).await;
    }
    if let Err(e) = sink.clear().await {
        tracing::warn!(error = %e, "failed to clear display on shutdown");
    }
    tracing::info!("display sink released");
}

/// Run one job with the policy's write timeout. Returns true on success.
async fn execute<S: DisplaySink>(
    sink: &mut S,
    job: &SinkJob,
    status: &SinkStatus,
    policy: &PriorityPolicy,
) -> bool {
    let timeout = Duration::from_millis(policy.sink_write_timeout_ms);
    let (result, was_clear) = match job {
        SinkJob::Frame(frame) => (
            tokio::time::timeout(timeout, sink.write_frame(frame)).await,
            false,
        ),
        SinkJob::Clear => (tokio::time::timeout(timeout, sink.clear()).await, true),
    };

    match result {
        Ok(Ok(())) => {
            status.record_success(was_clear);
            true
        }
        Ok(Err(e)) => {
            status.record_failure();
            tracing::debug!(error = %e, "sink write error");
            false
        }
        Err(_) => {
            status.record_failure();
            tracing::debug!("sink write timed out");
            false
        }
    }
}
