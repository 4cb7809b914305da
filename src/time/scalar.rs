//! Scalar (Lamport) clock: one monotonic counter per node.
//!
//! A bare integer cannot recover a partial order across nodes, so a scalar clock only
//! merges timestamps carrying its own identity (a local advance echoed back) and
//! treats everything else as foreign.

use crate::clock_traits::Clock;
use crate::error::ClockError;
use crate::time::wire::{self, Reader};
use crate::types::{NodeId, NODE_ID_LEN};

/// Packed size: identity plus a `u32` counter.
pub const SCALAR_PACKED_LEN: usize = NODE_ID_LEN + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScalarTimestamp {
    pub uuid: NodeId,
    pub counter: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScalarOptions {
    pub uuid: Option<NodeId>,
    pub scalar: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarClock {
    pub uuid: NodeId,
    pub scalar: u32,
}

impl Default for ScalarClock {
    fn default() -> Self {
        ScalarClock {
            uuid: NodeId::generate(),
            scalar: 0,
        }
    }
}

impl Clock for ScalarClock {
    type Timestamp = ScalarTimestamp;
    type Options = ScalarOptions;

    fn setup(options: ScalarOptions) -> Result<Self, ClockError> {
        Ok(ScalarClock {
            uuid: options.uuid.unwrap_or_else(NodeId::generate),
            scalar: options.scalar,
        })
    }

    fn advance(&self, delta: Option<u32>) -> Result<ScalarTimestamp, ClockError> {
        let delta = delta.unwrap_or(1);
        let counter = self.scalar.checked_add(delta).ok_or_else(|| {
            ClockError::InvalidInput(format!("delta {} overflows counter {}", delta, self.scalar))
        })?;
        Ok(ScalarTimestamp {
            uuid: self.uuid,
            counter,
        })
    }

    fn read(&self) -> ScalarTimestamp {
        ScalarTimestamp {
            uuid: self.uuid,
            counter: self.scalar,
        }
    }

    fn update(&mut self, timestamp: Option<&ScalarTimestamp>) -> Result<&mut Self, ClockError> {
        let Some(ts) = timestamp else {
            return Ok(self);
        };

        if !ts.uuid.same_as(&self.uuid) {
            tracing::debug!("Ignoring scalar update from foreign node {}", ts.uuid);
            return Ok(self);
        }

        self.scalar = self
            .scalar
            .max(ts.counter)
            .checked_add(1)
            .ok_or_else(|| ClockError::Overflow("scalar counter is at u32::MAX".into()))?;
        Ok(self)
    }

    fn are_incomparable(ts1: &ScalarTimestamp, ts2: &ScalarTimestamp) -> Result<bool, ClockError> {
        Ok(!ts1.uuid.same_as(&ts2.uuid))
    }

    fn happens_before(ts1: &ScalarTimestamp, ts2: &ScalarTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(ts1.counter < ts2.counter)
    }

    fn are_concurrent(ts1: &ScalarTimestamp, ts2: &ScalarTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(ts1.counter == ts2.counter)
    }

    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SCALAR_PACKED_LEN);
        wire::put_node_id(&mut buf, &self.uuid);
        wire::put_u32(&mut buf, self.scalar);
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, ClockError> {
        let mut reader = Reader::new(data, "ScalarClock");
        if data.len() != SCALAR_PACKED_LEN {
            return Err(reader.error(format!(
                "expected {} bytes, got {}",
                SCALAR_PACKED_LEN,
                data.len()
            )));
        }
        let uuid = reader.node_id()?;
        let scalar = reader.u32()?;
        reader.finish()?;
        Ok(ScalarClock { uuid, scalar })
    }
}
