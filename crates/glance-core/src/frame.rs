//! Render output units.
//!
//! A [`DisplayFrame`] is what the scheduler hands to the display sink:
//! the winning item's payload (or a fallback indicator) plus the dirty
//! regions the sink may use for partial refresh. Glyph rasterization is
//! the sink's problem, not ours.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Payload;
use crate::time::Millis;

/// Rectangular dirty region, in panel pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn full(width: u16, height: u16) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// What a frame carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameContent {
    /// A content item's payload.
    Item(Payload),
    /// Static indicator shown while the sink is degraded.
    FallbackIndicator,
}

/// One render request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayFrame {
    /// The item behind this frame; `None` for the fallback indicator.
    pub content_item_id: Option<Uuid>,
    pub content: FrameContent,
    /// Empty means "nothing changed, skip the write".
    pub dirty_regions: Vec<Rect>,
    pub render_ts: Millis,
}

impl DisplayFrame {
    pub fn for_item(id: Uuid, payload: Payload, dirty: Vec<Rect>, now: Millis) -> Self {
        Self {
            content_item_id: Some(id),
            content: FrameContent::Item(payload),
            dirty_regions: dirty,
            render_ts: now,
        }
    }

    pub fn fallback(dirty: Vec<Rect>, now: Millis) -> Self {
        Self {
            content_item_id: None,
            content: FrameContent::FallbackIndicator,
            dirty_regions: dirty,
            render_ts: now,
        }
    }
}
