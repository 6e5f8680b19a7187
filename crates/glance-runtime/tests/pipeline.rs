//! End-to-end pipeline tests on a paused tokio clock.
//!
//! Scripted adapters feed the real engine; a recording sink captures every
//! write. `start_paused` makes the tick interval, TTLs, write timeouts,
//! and backoff all advance deterministically, so the tests assert exact
//! render sequences.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use glance_core::{Payload, PriorityPolicy, RawEvent};
use glance_runtime::{
    AdapterContext, AdapterFuture, DisplayCaps, DisplaySink, SchedulerState, SinkError,
    SourceAdapter, StartError, start,
};

/// What the recording sink observed, in write order.
#[derive(Debug, Clone, PartialEq)]
enum Observed {
    /// A successful item frame, identified by its text.
    Text(String),
    Fallback,
    Clear,
}

#[derive(Default)]
struct SinkLog {
    records: Mutex<Vec<Observed>>,
    /// Writes left to fail before the panel "recovers".
    fail_remaining: AtomicU32,
    /// Simulated panel latency per frame write.
    write_delay_ms: AtomicU64,
}

impl SinkLog {
    fn observed(&self) -> Vec<Observed> {
        self.records.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct RecordingSink {
    log: Arc<SinkLog>,
}

impl RecordingSink {
    fn new() -> (Self, Arc<SinkLog>) {
        let log = Arc::new(SinkLog::default());
        (Self { log: Arc::clone(&log) }, log)
    }

    fn failing(failures: u32) -> (Self, Arc<SinkLog>) {
        let (sink, log) = Self::new();
        log.fail_remaining.store(failures, Ordering::Relaxed);
        (sink, log)
    }
}

impl DisplaySink for RecordingSink {
    fn capabilities(&self) -> DisplayCaps {
        DisplayCaps {
            width: 200,
            height: 200,
            color_depth: 1,
        }
    }

    fn write_frame(
        &mut self,
        frame: &glance_core::DisplayFrame,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        let log = Arc::clone(&self.log);
        let observed = match &frame.content {
            glance_core::FrameContent::Item(Payload::Text(t)) => Observed::Text(t.clone()),
            glance_core::FrameContent::Item(Payload::Bitmap { .. }) => {
                Observed::Text("<bitmap>".to_string())
            }
            glance_core::FrameContent::FallbackIndicator => Observed::Fallback,
        };
        async move {
            let delay = log.write_delay_ms.load(Ordering::Relaxed);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if log
                .fail_remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SinkError::Write("panel nak".to_string()));
            }
            log.records.lock().unwrap().push(observed);
            Ok(())
        }
    }

    fn clear(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send {
        let log = Arc::clone(&self.log);
        async move {
            log.records.lock().unwrap().push(Observed::Clear);
            Ok(())
        }
    }
}

/// Adapter that publishes a fixed script of (delay, category, text) steps.
struct ScriptedAdapter {
    id: &'static str,
    script: Vec<(u64, &'static str, String)>,
}

impl ScriptedAdapter {
    fn new(id: &'static str, script: Vec<(u64, &'static str, String)>) -> Box<Self> {
        Box::new(Self { id, script })
    }
}

impl SourceAdapter for ScriptedAdapter {
    fn source_id(&self) -> &str {
        self.id
    }

    fn run(self: Box<Self>, ctx: AdapterContext) -> AdapterFuture {
        Box::pin(async move {
            ctx.mark_connected(true);
            for (delay_ms, hint, text) in self.script {
                tokio::select! {
                    _ = ctx.shutdown().cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
                ctx.publish(RawEvent::text(self.id, hint, &text, ctx.now()));
            }
            ctx.shutdown().cancelled().await;
        })
    }
}

fn test_policy() -> PriorityPolicy {
    // RUST_LOG=glance_runtime=debug to watch a failing scenario.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    PriorityPolicy::default()
}

fn texts(observed: &[Observed]) -> Vec<String> {
    observed
        .iter()
        .filter_map(|o| match o {
            Observed::Text(t) => Some(t.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn splash_then_highest_priority_event() {
    let (sink, log) = RecordingSink::new();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        ScriptedAdapter::new("phone", vec![(200, "notification", "meeting in 5".into())]),
        ScriptedAdapter::new("weather", vec![(300, "ambient-status", "cloudy 14C".into())]),
    ];

    let handle = start(adapters, sink, test_policy()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let shown = texts(&log.observed());
    assert_eq!(
        shown,
        vec!["glance\nstarting...".to_string(), "meeting in 5".to_string()],
        "splash renders first, then the notification preempts the ambient line"
    );

    let stats = handle.stats();
    assert_eq!(stats.state, SchedulerState::Rendering);
    assert_eq!(stats.events_ingested, 2);
    assert_eq!(stats.items_created, 2, "one item per adapter event");
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rotation_consumes_slots() {
    let (sink, log) = RecordingSink::new();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        ScriptedAdapter::new("phone", vec![(100, "notification", "ping".into())]),
        ScriptedAdapter::new("assistant", vec![(100, "assistant-response", "42".into())]),
    ];

    let handle = start(adapters, sink, test_policy()).await.unwrap();
    // Default display slot is 5s; three slots is enough for both items
    // plus the forced rotation between them.
    tokio::time::sleep(Duration::from_secs(16)).await;
    handle.stop().await;

    let shown = texts(&log.observed());
    assert!(
        shown.contains(&"ping".to_string()) && shown.contains(&"42".to_string()),
        "both items get panel time across slots: {shown:?}"
    );
    let ping = shown.iter().position(|t| t == "ping").unwrap();
    let answer = shown.iter().position(|t| t == "42").unwrap();
    assert!(ping < answer, "higher base weight renders first");
}

#[tokio::test(start_paused = true)]
async fn transient_write_failure_retries_until_rendered() {
    let (sink, log) = RecordingSink::new();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![ScriptedAdapter::new(
        "phone",
        vec![(1_500, "notification", "call mom".into())],
    )];

    // Default failure threshold (3): a single failed write must never
    // escalate to degraded mode, and must never lose the frame.
    let handle = start(adapters, sink, test_policy()).await.unwrap();

    // Let the splash land, then fail exactly one write.
    tokio::time::sleep(Duration::from_millis(700)).await;
    log.fail_remaining.store(1, Ordering::Relaxed);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let shown = texts(&log.observed());
    assert!(
        shown.contains(&"call mom".to_string()),
        "a frame whose write failed once is re-dispatched: {shown:?}"
    );

    let stats = handle.stats();
    assert_eq!(stats.sink_consecutive_failures, 0);
    assert_eq!(stats.state, SchedulerState::Rendering);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn degraded_mode_and_recovery() {
    // Fail the first four writes, then recover.
    let (sink, log) = RecordingSink::failing(4);
    let mut policy = test_policy();
    policy.sink_failure_threshold = 1;

    let adapters: Vec<Box<dyn SourceAdapter>> = vec![ScriptedAdapter::new(
        "phone",
        vec![(100, "notification", "call mom".into())],
    )];

    let handle = start(adapters, sink, policy).await.unwrap();

    // Let the failures, backoff, probing, and recovery all play out.
    tokio::time::sleep(Duration::from_secs(40)).await;

    let observed = log.observed();
    let fallback_at = observed
        .iter()
        .position(|o| *o == Observed::Fallback)
        .expect("a recovery probe should land once the panel accepts writes");
    let item_after = observed[fallback_at..]
        .iter()
        .any(|o| matches!(o, Observed::Text(t) if t == "call mom"));
    assert!(
        item_after,
        "after recovery the real winner re-renders: {observed:?}"
    );

    let stats = handle.stats();
    assert_eq!(stats.state, SchedulerState::Rendering);
    assert_eq!(stats.sink_consecutive_failures, 0);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_clears_panel() {
    let (sink, log) = RecordingSink::new();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![ScriptedAdapter::new(
        "phone",
        vec![(100, "notification", "ping".into())],
    )];

    let handle = start(adapters, sink, test_policy()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.stop().await;

    let observed = log.observed();
    assert_eq!(
        observed.last(),
        Some(&Observed::Clear),
        "shutdown releases the panel blank: {observed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_adapter_is_isolated() {
    let (sink, log) = RecordingSink::new();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        ScriptedAdapter::new("rogue", vec![(100, "telepathy", "junk".into())]),
        ScriptedAdapter::new("phone", vec![(100, "notification", "still here".into())]),
    ];

    let handle = start(adapters, sink, test_policy()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(
        texts(&log.observed()).contains(&"still here".to_string()),
        "a malformed event never holds back other sources"
    );

    let stats = handle.stats();
    assert_eq!(stats.events_rejected, 1);
    let health = handle.health_snapshot();
    assert_eq!(health["rogue"].consecutive_errors, 1);
    assert_eq!(health["phone"].consecutive_errors, 0);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn offline_marker_for_silent_source() {
    let (sink, log) = RecordingSink::new();
    let mut policy = test_policy();
    policy.stale_after_ms = 8_000;

    // One event, then silence past the health window, then a late revival.
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![ScriptedAdapter::new(
        "phone",
        vec![
            (100, "notification", "hello".into()),
            (20_000, "notification", "hello again".into()),
        ],
    )];

    let handle = start(adapters, sink, policy).await.unwrap();
    // Stop observing before the revived source would go stale a second
    // time (8s after its last event).
    tokio::time::sleep(Duration::from_secs(27)).await;

    let shown = texts(&log.observed());
    assert!(
        shown.contains(&"phone offline".to_string()),
        "a stale source gets an offline marker on the panel: {shown:?}"
    );
    assert!(
        shown.contains(&"hello again".to_string()),
        "the revived source renders again: {shown:?}"
    );
    // The marker was removed on revival; only the live notification remains.
    assert_eq!(handle.stats().live_items, 1);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn idle_clear_waits_for_busy_sink() {
    // A panel that takes 200s per write, with the timeout raised to match:
    // the sink worker is still busy long after every item has expired, so
    // the clear cannot be accepted at the tick the idle threshold is
    // crossed. It must still happen once the worker frees up.
    let (sink, log) = RecordingSink::new();
    log.write_delay_ms.store(200_000, Ordering::Relaxed);
    let mut policy = test_policy();
    policy.sink_write_timeout_ms = 300_000;
    // Keep the source healthy for the whole run; staleness is not what is
    // under test here.
    policy.stale_after_ms = 1_000_000_000;

    let adapters: Vec<Box<dyn SourceAdapter>> = vec![ScriptedAdapter::new(
        "clock",
        vec![(100, "time", "now 09:00".into())],
    )];

    let handle = start(adapters, sink, policy).await.unwrap();
    tokio::time::sleep(Duration::from_secs(450)).await;

    let observed = log.observed();
    assert_eq!(
        observed.last(),
        Some(&Observed::Clear),
        "the idle clear survives a busy worker: {observed:?}"
    );
    assert_eq!(handle.stats().state, SchedulerState::Idle);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn idle_clear_after_everything_expires() {
    // No adapters: only the splash item exists, and its system-category
    // TTL is short. Once it expires the scheduler idles and eventually
    // clears the panel.
    let (sink, log) = RecordingSink::new();
    let handle = start(Vec::new(), sink, test_policy()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;

    let observed = log.observed();
    assert!(
        observed.contains(&Observed::Clear),
        "quiet panel is cleared, not left on the last frame: {observed:?}"
    );
    assert_eq!(handle.stats().state, SchedulerState::Idle);
    assert_eq!(handle.stats().live_items, 0);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn burst_overflow_drops_oldest() {
    let (sink, log) = RecordingSink::new();
    let mut policy = test_policy();
    policy.queue_capacity = 4;

    // 20 distinct events in one burst, well over the buffer.
    let script: Vec<(u64, &'static str, String)> = (0..20)
        .map(|i| (if i == 0 { 100 } else { 0 }, "notification", format!("burst-{i}")))
        .collect();
    let adapters: Vec<Box<dyn SourceAdapter>> =
        vec![ScriptedAdapter::new("phone", script)];

    let handle = start(adapters, sink, policy).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = handle.stats();
    assert_eq!(stats.queue_overflows, 16);
    assert_eq!(stats.events_ingested, 4, "only the newest survive the burst");
    // The newest event of the burst is among the live candidates.
    assert!(
        texts(&log.observed())
            .iter()
            .any(|t| t.starts_with("burst-")),
        "something from the burst still renders"
    );
    handle.stop().await;
}

#[tokio::test]
async fn duplicate_source_refused() {
    let (sink, _log) = RecordingSink::new();
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        ScriptedAdapter::new("phone", vec![]),
        ScriptedAdapter::new("phone", vec![]),
    ];

    let err = start(adapters, sink, test_policy()).await.unwrap_err();
    assert_eq!(err, StartError::DuplicateSource("phone".to_string()));
}

#[tokio::test]
async fn invalid_policy_refused() {
    let (sink, _log) = RecordingSink::new();
    let mut policy = test_policy();
    policy.tick_interval_ms = 0;

    let err = start(Vec::new(), sink, policy).await.unwrap_err();
    assert!(matches!(err, StartError::Policy(_)));
}
