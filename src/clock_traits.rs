//! Defines the traits every clock variant implements.

use crate::error::ClockError;
use crate::types::NodeId;

/// The capability set shared by all logical clocks.
///
/// A node owns exactly one instance. To emit an event it calls [`Clock::advance`] to
/// compute a candidate timestamp, applies it locally through [`Clock::update`] and ships
/// [`Clock::pack`] output to peers, who [`Clock::unpack`] and `update` in turn. Ordering
/// questions are answered from two timestamps alone through the static predicates.
pub trait Clock: Sized {
    /// Immutable value describing a point in this clock's time.
    type Timestamp: Clone + std::fmt::Debug + PartialEq;

    /// Construction options. `Default` starts the clock at its zero element with a fresh
    /// identity.
    type Options: Default;

    /// Builds a new instance from `options`.
    ///
    /// # Errors
    /// `ClockError::InvalidInput` when the options describe an impossible state.
    fn setup(options: Self::Options) -> Result<Self, ClockError>;

    /// Computes the timestamp `delta` units (default: one) ahead of this clock's own
    /// position. Does not mutate.
    ///
    /// # Errors
    /// `ClockError::InvalidInput` when the delta cannot be applied.
    fn advance(&self, delta: Option<u32>) -> Result<Self::Timestamp, ClockError>;

    /// Returns the current timestamp.
    fn read(&self) -> Self::Timestamp;

    /// Merges an observed timestamp into local state. `None` is a no-op, and so is a
    /// timestamp whose identity the merge rule ignores.
    ///
    /// # Errors
    /// `ClockError::ShapeMismatch` when the timestamp cannot be reconciled with local
    /// state; `ClockError::Overflow` when the merge would overflow a counter.
    fn update(&mut self, timestamp: Option<&Self::Timestamp>) -> Result<&mut Self, ClockError>;

    /// Whether the two timestamps cannot be ordered at all.
    fn are_incomparable(ts1: &Self::Timestamp, ts2: &Self::Timestamp) -> Result<bool, ClockError>;

    /// Whether `ts1` is causally before `ts2`. False for incomparable timestamps.
    fn happens_before(ts1: &Self::Timestamp, ts2: &Self::Timestamp) -> Result<bool, ClockError>;

    /// Whether the timestamps are comparable but unordered. False for incomparable
    /// timestamps.
    fn are_concurrent(ts1: &Self::Timestamp, ts2: &Self::Timestamp) -> Result<bool, ClockError>;

    /// Canonical big-endian encoding of the clock.
    fn pack(&self) -> Vec<u8>;

    /// Decodes a clock from [`Clock::pack`] output.
    ///
    /// # Errors
    /// `ClockError::DecodeError` when the buffer does not match the layout.
    fn unpack(data: &[u8]) -> Result<Self, ClockError>;
}

/// Clocks whose participant set grows as new nodes are observed.
pub trait ChainClock: Clock {
    /// Participants in the order they were first seen.
    fn participants(&self) -> Vec<NodeId>;

    /// This clock's counter for `participant`, if it has been seen.
    fn counter_of(&self, participant: &NodeId) -> Option<u64>;
}

/// A single NTP-style exchange with a peer; every field is a wall-clock reading in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoundTrip {
    pub local_sent: u64,
    pub peer_received: u64,
    pub peer_sent: u64,
    pub local_received: u64,
}

impl From<(u64, u64, u64, u64)> for RoundTrip {
    fn from(value: (u64, u64, u64, u64)) -> Self {
        RoundTrip {
            local_sent: value.0,
            peer_received: value.1,
            peer_sent: value.2,
            local_received: value.3,
        }
    }
}

/// Clocks with a physical component that can be pulled toward the cluster's time.
pub trait HybridTime: Clock {
    /// Offset of this node's clock relative to the peer of each observation, in
    /// milliseconds, assuming symmetric network delay.
    fn calculate_offset(observations: &[RoundTrip]) -> Vec<i64>;

    /// Moves the clock's correction toward the median of `offsets`, which are measured
    /// against the uncorrected time source. Emitted timestamps are not rewritten.
    fn synchronize(&mut self, offsets: &[i64]) -> &mut Self;
}
