//! Vector clock: a fixed-length sequence of per-node counters.
//!
//! Assume there are N processes, each owning a vector clock `VC_i` over an underlying
//! list `V_i` of size N such that:
//! - `V_i[i]` is the number of events that have taken place at process `i`,
//! - `V_i[j]` is the number of events process `i` **knows** to have taken place at `j`.
//!
//! Comparing vector timestamps `U` and `V`:
//! - `U == V` iff `U[k] == V[k]` for every `k`,
//! - `U < V` iff `U[k] <= V[k]` for every `k` _and_ `U[j] < V[j]` for some `j`,
//! - `U || V` (concurrent) iff neither `U < V` nor `V < U`.
//!
//! Updates are only applied when tagged with this clock's own identity: the clock
//! models an externally delivered but locally authored causal frontier. Peer-to-peer
//! merging is what the chain and hybrid clocks are for.

use crate::clock_traits::Clock;
use crate::error::ClockError;
use crate::time::wire::{self, Reader};
use crate::types::{NodeId, NODE_ID_LEN};

const HEADER_LEN: usize = NODE_ID_LEN + 4;
const SLOT_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PartialOrder {
    LessThan,
    GreaterThan,
    Equal,
    Concurrent,
}

impl PartialOrder {
    /// Folds per-slot comparisons, where `le` means every slot of the left side was
    /// `<=` the right side and `ge` the converse.
    pub(crate) fn from_bounds(le: bool, ge: bool) -> Self {
        match (le, ge) {
            (true, true) => PartialOrder::Equal,
            (true, false) => PartialOrder::LessThan,
            (false, true) => PartialOrder::GreaterThan,
            (false, false) => PartialOrder::Concurrent,
        }
    }
}

/// Compares two equal-length counter vectors.
pub fn compare(v1: &[u32], v2: &[u32]) -> PartialOrder {
    let mut v1_le_v2 = true;
    let mut v2_le_v1 = true;

    for (a, b) in v1.iter().zip(v2) {
        if a > b {
            v1_le_v2 = false;
        }
        if a < b {
            v2_le_v1 = false;
        }
    }
    PartialOrder::from_bounds(v1_le_v2, v2_le_v1)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VectorTimestamp {
    pub uuid: NodeId,
    pub vector: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VectorOptions {
    pub uuid: Option<NodeId>,
    pub index: u32,
    pub vector: Vec<u32>,
}

impl Default for VectorOptions {
    fn default() -> Self {
        VectorOptions {
            uuid: None,
            index: 0,
            vector: vec![0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorClock {
    pub uuid: NodeId,
    index: u32,
    pub vector: Vec<u32>,
}

impl VectorClock {
    /// Slot owned by this node.
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// The owned slot, or `InvalidInput` once `slots` no longer reaches `index`.
pub(crate) fn own_slot<T>(slots: &mut [T], index: u32) -> Result<&mut T, ClockError> {
    let len = slots.len();
    slots.get_mut(index as usize).ok_or_else(|| {
        ClockError::InvalidInput(format!("own index {} out of range for {} slots", index, len))
    })
}

impl Clock for VectorClock {
    type Timestamp = VectorTimestamp;
    type Options = VectorOptions;

    fn setup(options: VectorOptions) -> Result<Self, ClockError> {
        if options.vector.is_empty() {
            return Err(ClockError::InvalidInput("vector must have at least one slot".into()));
        }
        if options.index as usize >= options.vector.len() {
            return Err(ClockError::InvalidInput(format!(
                "index {} out of range for a vector of {} slots",
                options.index,
                options.vector.len()
            )));
        }
        Ok(VectorClock {
            uuid: options.uuid.unwrap_or_else(NodeId::generate),
            index: options.index,
            vector: options.vector,
        })
    }

    fn advance(&self, delta: Option<u32>) -> Result<VectorTimestamp, ClockError> {
        let delta = delta.unwrap_or(1);
        let mut vector = self.vector.clone();
        let own = own_slot(&mut vector, self.index)?;
        *own = own.checked_add(delta).ok_or_else(|| {
            ClockError::InvalidInput(format!("delta {} overflows slot {}", delta, self.index))
        })?;
        Ok(VectorTimestamp {
            uuid: self.uuid,
            vector,
        })
    }

    fn read(&self) -> VectorTimestamp {
        VectorTimestamp {
            uuid: self.uuid,
            vector: self.vector.clone(),
        }
    }

    /// Takes the element-wise maximum with `timestamp`, then counts the receipt as a new
    /// local event.
    fn update(&mut self, timestamp: Option<&VectorTimestamp>) -> Result<&mut Self, ClockError> {
        let Some(ts) = timestamp else {
            return Ok(self);
        };

        if ts.vector.len() != self.vector.len() {
            tracing::warn!(
                "Rejecting vector update with {} slots, local clock has {}",
                ts.vector.len(),
                self.vector.len()
            );
            return Err(ClockError::ShapeMismatch(format!(
                "update has {} slots, clock has {}",
                ts.vector.len(),
                self.vector.len()
            )));
        }

        if !ts.uuid.same_as(&self.uuid) {
            tracing::debug!("Ignoring vector update from foreign node {}", ts.uuid);
            return Ok(self);
        }

        let mut vector: Vec<u32> = self
            .vector
            .iter()
            .zip(&ts.vector)
            .map(|(local, peer)| (*local).max(*peer))
            .collect();
        let own = own_slot(&mut vector, self.index)?;
        *own = own
            .checked_add(1)
            .ok_or_else(|| ClockError::Overflow(format!("slot {} is at u32::MAX", self.index)))?;

        self.vector = vector;
        Ok(self)
    }

    fn are_incomparable(ts1: &VectorTimestamp, ts2: &VectorTimestamp) -> Result<bool, ClockError> {
        Ok(ts1.vector.len() != ts2.vector.len() || !ts1.uuid.same_as(&ts2.uuid))
    }

    fn happens_before(ts1: &VectorTimestamp, ts2: &VectorTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(compare(&ts1.vector, &ts2.vector) == PartialOrder::LessThan)
    }

    fn are_concurrent(ts1: &VectorTimestamp, ts2: &VectorTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(matches!(
            compare(&ts1.vector, &ts2.vector),
            PartialOrder::Concurrent | PartialOrder::Equal
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + SLOT_LEN * self.vector.len());
        wire::put_node_id(&mut buf, &self.uuid);
        wire::put_u32(&mut buf, self.index);
        for v in &self.vector {
            wire::put_u32(&mut buf, *v);
        }
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, ClockError> {
        let slots = wire::slot_count(data, HEADER_LEN, SLOT_LEN, 1, "VectorClock")?;
        let mut reader = Reader::new(data, "VectorClock");
        let uuid = reader.node_id()?;
        let index = reader.u32()?;
        let vector = (0..slots).map(|_| reader.u32()).collect::<Result<Vec<_>, _>>()?;
        if index as usize >= slots {
            return Err(reader.error(format!("index {} out of range for {} slots", index, slots)));
        }
        reader.finish()?;
        Ok(VectorClock { uuid, index, vector })
    }
}
