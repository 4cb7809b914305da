//!
//! Defines error types for clock operations.

/// Represents errors that can occur while building, advancing, merging, comparing or
/// decoding clocks. All of them are local validation failures: callers fix the call
/// site rather than retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// A constructor option or an `advance` delta has an unusable shape or value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A merged timestamp cannot be reconciled with local state (arity, participants, widths).
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A timestamp handed to a comparison predicate violates its structural rules.
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),
    /// A packed buffer does not match the layout of the clock it is decoded as.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// A merge would push a counter past the width it is encoded with.
    #[error("Counter overflow: {0}")]
    Overflow(String),
}
