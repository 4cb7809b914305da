#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Logical clocks for ordering events across distributed nodes.
//!
//! Each clock follows the same contract ([`Clock`]): `advance` proposes the next
//! timestamp without mutating, `update` merges a received (or self-proposed) timestamp,
//! the three predicates classify a pair of timestamps, and `pack`/`unpack` move clock
//! state over the wire in big-endian form.
//!
//! | Clock | Timestamp | Ordering |
//! |---|---|---|
//! | [`ScalarClock`] | `u32` counter | total, per identity |
//! | [`VectorClock`] | fixed `u32` slots | partial |
//! | [`DynamicChainClock`] | growing participant entries | partial |
//! | [`AntichainChainClock`] | entries plus concurrent-write frontier | partial |
//! | [`VariableChainClock`] | entries with per-participant width | partial |
//! | [`HybridClock`] | `(physical ms, logical)` | total, per identity |

// Node identity.
pub mod types;

// Error type shared by every clock.
pub mod error;

// The clock contract and the chain / hybrid extensions.
pub mod clock_traits;

// Loading clock options from JSON.
pub mod config;

// Byte helpers, debug rendering and the bounded queue.
pub mod misc;

// Clock implementations.
pub mod time;

pub use clock_traits::{ChainClock, Clock, HybridTime, RoundTrip};
pub use error::ClockError;
pub use time::*;
pub use types::NodeId;
