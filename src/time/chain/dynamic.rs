//! Dynamic chain clock: a vector clock that grows a zero-initialized entry the first
//! time a merged timestamp mentions an unseen participant.

use super::{
    as_counts, check_entries, compare, merge_entries, position_of, put_entries, read_entries,
    seed_entries, shares_participant, ChainEntry, ENTRY_LEN,
};
use crate::clock_traits::{ChainClock, Clock};
use crate::error::ClockError;
use crate::time::vector::{own_slot, PartialOrder};
use crate::time::wire::{self, Reader};
use crate::types::{NodeId, NODE_ID_LEN};

const HEADER_LEN: usize = NODE_ID_LEN + 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChainTimestamp {
    pub uuid: NodeId,
    pub entries: Vec<ChainEntry>,
}

impl ChainTimestamp {
    fn validate(&self) -> Result<(), ClockError> {
        check_entries(&self.uuid, &self.entries).map_err(ClockError::MalformedTimestamp)
    }
}

/// Options shared by the `u32` chain clocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    pub uuid: Option<NodeId>,
    /// Initial value of this node's own entry.
    pub counter: u32,
    /// Participants already known at startup. The own entry is appended if missing.
    pub entries: Vec<ChainEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicChainClock {
    pub uuid: NodeId,
    index: u32,
    pub entries: Vec<ChainEntry>,
}

impl DynamicChainClock {
    /// Position of this node's own entry.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Clock for DynamicChainClock {
    type Timestamp = ChainTimestamp;
    type Options = ChainOptions;

    fn setup(options: ChainOptions) -> Result<Self, ClockError> {
        let uuid = options.uuid.unwrap_or_else(NodeId::generate);
        let (entries, index) = seed_entries(uuid, options.counter, options.entries)?;
        Ok(DynamicChainClock { uuid, index, entries })
    }

    fn advance(&self, delta: Option<u32>) -> Result<ChainTimestamp, ClockError> {
        let delta = delta.unwrap_or(1);
        let mut entries = self.entries.clone();
        let own = own_slot(&mut entries, self.index)?;
        let current = own.counter;
        own.counter = current.checked_add(delta).ok_or_else(|| {
            ClockError::InvalidInput(format!("delta {} overflows own entry {}", delta, current))
        })?;
        Ok(ChainTimestamp {
            uuid: self.uuid,
            entries,
        })
    }

    fn read(&self) -> ChainTimestamp {
        ChainTimestamp {
            uuid: self.uuid,
            entries: self.entries.clone(),
        }
    }

    fn update(&mut self, timestamp: Option<&ChainTimestamp>) -> Result<&mut Self, ClockError> {
        let Some(ts) = timestamp else {
            return Ok(self);
        };

        if let Err(reason) = check_entries(&ts.uuid, &ts.entries) {
            tracing::warn!("Rejecting chain update from {}: {}", ts.uuid, reason);
            return Err(ClockError::ShapeMismatch(reason));
        }

        merge_entries(&mut self.entries, &ts.entries);
        Ok(self)
    }

    fn are_incomparable(ts1: &ChainTimestamp, ts2: &ChainTimestamp) -> Result<bool, ClockError> {
        ts1.validate()?;
        ts2.validate()?;
        Ok(!shares_participant(
            ts1.entries.iter().map(|e| &e.participant),
            ts2.entries.iter().map(|e| &e.participant),
        ))
    }

    fn happens_before(ts1: &ChainTimestamp, ts2: &ChainTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(compare(as_counts(&ts1.entries), as_counts(&ts2.entries)) == PartialOrder::LessThan)
    }

    fn are_concurrent(ts1: &ChainTimestamp, ts2: &ChainTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(matches!(
            compare(as_counts(&ts1.entries), as_counts(&ts2.entries)),
            PartialOrder::Concurrent | PartialOrder::Equal
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN * self.entries.len());
        wire::put_node_id(&mut buf, &self.uuid);
        wire::put_u32(&mut buf, self.index);
        put_entries(&mut buf, &self.entries);
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, ClockError> {
        let count = wire::slot_count(data, HEADER_LEN, ENTRY_LEN, 1, "DynamicChainClock")?;
        let mut reader = Reader::new(data, "DynamicChainClock");
        let uuid = reader.node_id()?;
        let index = reader.u32()?;
        let entries = read_entries(&mut reader, count)?;

        if position_of(entries.iter().map(|e| &e.participant), &uuid) != Some(index as usize) {
            return Err(reader.error(format!("index {} does not point at the own entry", index)));
        }
        if let Err(reason) = check_entries(&uuid, &entries) {
            return Err(reader.error(reason));
        }
        reader.finish()?;
        Ok(DynamicChainClock { uuid, index, entries })
    }
}

impl ChainClock for DynamicChainClock {
    fn participants(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.participant).collect()
    }

    fn counter_of(&self, participant: &NodeId) -> Option<u64> {
        position_of(self.entries.iter().map(|e| &e.participant), participant)
            .map(|i| u64::from(self.entries[i].counter))
    }
}
