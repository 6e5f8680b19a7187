use std::fmt;

use crate::event::Category;

/// Fatal configuration error. The engine refuses to start on any of these;
/// there is no partial-policy mode.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// A category has no base weight in the policy.
    MissingWeight(Category),
    /// A field that must be strictly positive is zero or negative.
    NonPositive(&'static str),
    /// A field is outside its valid range.
    OutOfRange {
        field: &'static str,
        detail: String,
    },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::MissingWeight(cat) => {
                write!(f, "no base weight for category '{}'", cat.as_str())
            }
            PolicyError::NonPositive(field) => {
                write!(f, "policy field '{field}' must be positive")
            }
            PolicyError::OutOfRange { field, detail } => {
                write!(f, "policy field '{field}' out of range: {detail}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Per-event rejection. Absorbed by the aggregator: the event is dropped
/// and counted, the batch continues.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptySourceId,
    UnknownCategory(String),
    EmptyText,
    TextTooLong(usize),
    BitmapEmpty,
    BitmapSizeMismatch { expected: usize, got: usize },
    BitmapTooLarge { width: u16, height: u16 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptySourceId => write!(f, "event has empty source_id"),
            ValidationError::UnknownCategory(hint) => {
                write!(f, "unknown category hint '{hint}'")
            }
            ValidationError::EmptyText => write!(f, "text payload is empty"),
            ValidationError::TextTooLong(len) => {
                write!(f, "text payload is {len} bytes, over the limit")
            }
            ValidationError::BitmapEmpty => write!(f, "bitmap payload has zero dimension"),
            ValidationError::BitmapSizeMismatch { expected, got } => {
                write!(f, "bitmap bits length {got}, expected {expected}")
            }
            ValidationError::BitmapTooLarge { width, height } => {
                write!(f, "bitmap {width}x{height} exceeds panel limits")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
