//! Glance selection engine: the ingest/aggregation/prioritization core of
//! a wearable companion display.
//!
//! Several independent sources (phone link, web pollers, an assistant
//! client) compete for one tiny monochrome panel. This crate decides what
//! is shown: raw events are validated and collapsed into deduplicated
//! [`ContentItem`]s, and every tick the [`PriorityManager`] arbitrates the
//! live set with freshness decay, anti-starvation aging, and deterministic
//! tie-breaks.
//!
//! Zero I/O — no clocks, no channels, no display driver. Every operation
//! takes an explicit timestamp, so scheduling is reproducible in tests.
//! The tokio plumbing lives in `glance-runtime`.

pub mod aggregate;
pub mod constants;
pub mod content;
pub mod error;
pub mod event;
pub mod frame;
pub mod health;
pub mod item;
pub mod policy;
pub mod select;
pub mod time;

pub use aggregate::{Aggregator, BatchOutcome};
pub use content::ContentSet;
pub use error::{PolicyError, ValidationError};
pub use event::{Category, Payload, RawEvent, dedup_key, validate_event};
pub use frame::{DisplayFrame, FrameContent, Rect};
pub use health::{AdapterState, HealthRegistry};
pub use item::ContentItem;
pub use policy::PriorityPolicy;
pub use select::{PriorityManager, Selection, SelectionOutcome};
pub use time::{Millis, age_millis, now_unix_millis};
