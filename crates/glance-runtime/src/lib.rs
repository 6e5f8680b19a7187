//! Async runtime for the glance display pipeline.
//!
//! `glance-core` decides *what* to show; this crate makes it happen on a
//! real device. It owns all the I/O seams: [`SourceAdapter`]s produce raw
//! events into a bounded [`IngestBus`], a tick-driven scheduler drains,
//! aggregates, and arbitrates them, and a dedicated worker task serializes
//! writes to the one [`DisplaySink`].
//!
//! ```no_run
//! # use glance_core::PriorityPolicy;
//! # async fn demo(adapters: Vec<Box<dyn glance_runtime::SourceAdapter>>,
//! #               sink: impl glance_runtime::DisplaySink) -> anyhow::Result<()> {
//! let handle = glance_runtime::start(adapters, sink, PriorityPolicy::default()).await?;
//! // ... run until the host asks us to stop ...
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ingest;
mod scheduler;
pub mod sink;
pub mod stats;

pub use adapter::{AdapterContext, AdapterFuture, SourceAdapter};
pub use clock::Clock;
pub use engine::{EngineHandle, start};
pub use error::{SinkError, StartError};
pub use ingest::{IngestBus, PublishOutcome};
pub use sink::{DisplayCaps, DisplaySink, SinkStatus};
pub use stats::{SchedulerState, StatsSnapshot};
