//! Logical clocks: scalar (Lamport), vector, chain and hybrid.
//!
//! Every clock implements [`crate::clock_traits::Clock`]. Vector-style comparison
//! helpers live in `time::vector` (fixed slots) and `time::chain` (participant-keyed).

pub mod chain;
pub mod hybrid;
pub mod scalar;
pub mod vector;

pub(crate) mod wire;

// Re-export the clock types so `crate::time::*` covers the common paths.
pub use chain::{
    AntichainChainClock, AntichainOptions, AntichainTimestamp, ChainEntry, ChainOptions, ChainTimestamp,
    CounterWidth, DynamicChainClock, VariableChainClock, VariableEntry, VariableOptions, VariableTimestamp,
};
pub use hybrid::{HybridClock, HybridOptions, HybridTimestamp, ManualTimeSource, SystemTimeSource, TimeSource};
pub use scalar::{ScalarClock, ScalarOptions, ScalarTimestamp};
pub use vector::{PartialOrder, VectorClock, VectorOptions, VectorTimestamp};
