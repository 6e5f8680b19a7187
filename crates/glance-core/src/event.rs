//! Raw events and their canonical identity.
//!
//! Adapters emit [`RawEvent`]s with a free-form category hint; the
//! aggregator validates the hint against the closed [`Category`] set and
//! collapses repeats through [`dedup_key`]. Identity is source + category +
//! normalized payload, so a phone that re-sends the same notification five
//! times produces one item with `occurrence_count = 5`, not five items.

use std::hash::{DefaultHasher, Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BITMAP_DIM, MAX_TEXT_BYTES};
use crate::error::ValidationError;
use crate::time::Millis;

/// Closed set of content categories. Policy lookups (base weight, TTL) are
/// total over this enum, so an unknown hint is a validation failure rather
/// than a silently default-weighted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Notification,
    AssistantResponse,
    AmbientStatus,
    TimeOfDay,
    System,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Notification,
        Category::AssistantResponse,
        Category::AmbientStatus,
        Category::TimeOfDay,
        Category::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Notification => "notification",
            Category::AssistantResponse => "assistant-response",
            Category::AmbientStatus => "ambient-status",
            Category::TimeOfDay => "time-of-day",
            Category::System => "system",
        }
    }

    /// Parse an adapter's category hint. Accepts the kebab-case names plus
    /// the legacy aliases the phone link protocol still sends.
    pub fn from_hint(hint: &str) -> Option<Category> {
        match hint.trim().to_lowercase().as_str() {
            "notification" => Some(Category::Notification),
            "assistant-response" | "assistant" | "text" => Some(Category::AssistantResponse),
            "ambient-status" | "status" | "weather" => Some(Category::AmbientStatus),
            "time-of-day" | "time" | "date" => Some(Category::TimeOfDay),
            "system" => Some(Category::System),
            _ => None,
        }
    }
}

/// Displayable payload fragment, sized for the target panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Bitmap {
        width: u16,
        height: u16,
        /// Packed 1-bpp, row-major, rows padded to whole bytes.
        bits: Vec<u8>,
    },
}

impl Payload {
    /// Packed byte length a `width`x`height` 1-bpp bitmap must have.
    pub fn packed_len(width: u16, height: u16) -> usize {
        (width as usize).div_ceil(8) * height as usize
    }
}

/// One discrete piece of information produced by a source adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub source_id: String,
    pub timestamp: Millis,
    pub category_hint: String,
    pub payload: Payload,
    /// Flagged by the adapter for content that warrants the policy's
    /// urgency bonus (e.g. a phone call, a critical battery alert).
    pub urgent: bool,
}

impl RawEvent {
    pub fn text(source_id: &str, category_hint: &str, text: &str, timestamp: Millis) -> Self {
        Self {
            source_id: source_id.to_string(),
            timestamp,
            category_hint: category_hint.to_string(),
            payload: Payload::Text(text.to_string()),
            urgent: false,
        }
    }
}

/// Validate a raw event, resolving its category. Malformed events are
/// dropped by the caller; nothing here is fatal.
pub fn validate_event(event: &RawEvent) -> Result<Category, ValidationError> {
    if event.source_id.trim().is_empty() {
        return Err(ValidationError::EmptySourceId);
    }
    let category = Category::from_hint(&event.category_hint)
        .ok_or_else(|| ValidationError::UnknownCategory(event.category_hint.clone()))?;

    match &event.payload {
        Payload::Text(text) => {
            if text.trim().is_empty() {
                return Err(ValidationError::EmptyText);
            }
            if text.len() > MAX_TEXT_BYTES {
                return Err(ValidationError::TextTooLong(text.len()));
            }
        }
        Payload::Bitmap {
            width,
            height,
            bits,
        } => {
            if *width == 0 || *height == 0 {
                return Err(ValidationError::BitmapEmpty);
            }
            if *width > MAX_BITMAP_DIM || *height > MAX_BITMAP_DIM {
                return Err(ValidationError::BitmapTooLarge {
                    width: *width,
                    height: *height,
                });
            }
            let expected = Payload::packed_len(*width, *height);
            if bits.len() != expected {
                return Err(ValidationError::BitmapSizeMismatch {
                    expected,
                    got: bits.len(),
                });
            }
        }
    }

    Ok(category)
}

/// Canonical identity for dedup: `source : category : payload-hash`.
///
/// Text is lowercased with whitespace runs collapsed before hashing, so
/// "Meeting at  3pm" and "meeting at 3pm\n" collapse to one item. Bitmaps
/// hash their packed bits directly.
pub fn dedup_key(source_id: &str, category: Category, payload: &Payload) -> String {
    let mut hasher = DefaultHasher::new();
    match payload {
        Payload::Text(text) => {
            for word in text.split_whitespace() {
                word.to_lowercase().hash(&mut hasher);
            }
        }
        Payload::Bitmap {
            width,
            height,
            bits,
        } => {
            width.hash(&mut hasher);
            height.hash(&mut hasher);
            bits.hash(&mut hasher);
        }
    }
    format!("{source_id}:{}:{:016x}", category.as_str(), hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_aliases() {
        assert_eq!(Category::from_hint("Notification"), Some(Category::Notification));
        assert_eq!(Category::from_hint("weather"), Some(Category::AmbientStatus));
        assert_eq!(Category::from_hint("time"), Some(Category::TimeOfDay));
        assert_eq!(Category::from_hint("telemetry"), None);
    }

    #[test]
    fn test_validate_ok() {
        let ev = RawEvent::text("phone", "notification", "New message", 1_000);
        assert_eq!(validate_event(&ev), Ok(Category::Notification));
    }

    #[test]
    fn test_validate_rejects_blank_text() {
        let ev = RawEvent::text("phone", "notification", "   \n", 1_000);
        assert_eq!(validate_event(&ev), Err(ValidationError::EmptyText));
    }

    #[test]
    fn test_validate_rejects_unknown_hint() {
        let ev = RawEvent::text("phone", "telepathy", "hi", 1_000);
        assert!(matches!(
            validate_event(&ev),
            Err(ValidationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_validate_bitmap_length() {
        let mut ev = RawEvent::text("phone", "system", "x", 0);
        // 10 px wide → 2 bytes/row, 4 rows → 8 bytes
        ev.payload = Payload::Bitmap {
            width: 10,
            height: 4,
            bits: vec![0u8; 8],
        };
        assert_eq!(validate_event(&ev), Ok(Category::System));

        ev.payload = Payload::Bitmap {
            width: 10,
            height: 4,
            bits: vec![0u8; 7],
        };
        assert_eq!(
            validate_event(&ev),
            Err(ValidationError::BitmapSizeMismatch {
                expected: 8,
                got: 7
            })
        );
    }

    #[test]
    fn test_dedup_key_normalizes_whitespace_and_case() {
        let a = dedup_key(
            "phone",
            Category::Notification,
            &Payload::Text("Meeting at  3pm".into()),
        );
        let b = dedup_key(
            "phone",
            Category::Notification,
            &Payload::Text("meeting at 3pm\n".into()),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_dedup_key_distinguishes_source_and_category() {
        let text = Payload::Text("ready".into());
        let a = dedup_key("phone", Category::Notification, &text);
        let b = dedup_key("watch", Category::Notification, &text);
        let c = dedup_key("phone", Category::AmbientStatus, &text);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
