//! Antichain chain clock.
//!
//! Besides the participant-keyed summary of everything observed (the same state a
//! [`DynamicChainClock`](super::DynamicChainClock) keeps), this clock tracks the
//! **frontier**: the maximal antichain of observed event dots `(participant, counter)`.
//! A frontier of more than one dot means concurrent writes that no later event has
//! reconciled yet. Dominated dots are pruned on every merge, so the frontier never
//! holds more history than the concurrent tips.
//!
//! Every observed dot is below some frontier dot, and a dot is observed iff the
//! summary covers it. So a local dot is dominated by the peer exactly when the peer
//! summary covers it and the peer frontier does not contain it, and symmetrically.

use super::{
    as_counts, check_entries, compare, merge_entries, position_of, put_entries, read_entries,
    seed_entries, shares_participant, ChainEntry, ChainOptions, ENTRY_LEN,
};
use crate::clock_traits::{ChainClock, Clock};
use crate::error::ClockError;
use crate::time::vector::{own_slot, PartialOrder};
use crate::time::wire::{self, Reader};
use crate::types::{NodeId, NODE_ID_LEN};

const HEADER_LEN: usize = NODE_ID_LEN + 4 + 4;

pub type AntichainOptions = ChainOptions;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AntichainTimestamp {
    pub uuid: NodeId,
    /// Summary of everything the emitter has observed.
    pub entries: Vec<ChainEntry>,
    /// Maximal concurrent dots.
    pub frontier: Vec<ChainEntry>,
}

impl AntichainTimestamp {
    fn validate(&self) -> Result<(), ClockError> {
        check_shape(&self.uuid, &self.entries, &self.frontier).map_err(ClockError::MalformedTimestamp)
    }
}

fn covers(summary: &[ChainEntry], dot: &ChainEntry) -> bool {
    summary
        .iter()
        .any(|e| e.participant.same_as(&dot.participant) && e.counter >= dot.counter)
}

fn contains(frontier: &[ChainEntry], dot: &ChainEntry) -> bool {
    frontier
        .iter()
        .any(|e| e.participant.same_as(&dot.participant) && e.counter == dot.counter)
}

fn check_shape(uuid: &NodeId, entries: &[ChainEntry], frontier: &[ChainEntry]) -> Result<(), String> {
    check_entries(uuid, entries)?;
    for (i, dot) in frontier.iter().enumerate() {
        if dot.counter == 0 {
            return Err(format!("frontier dot for {} has counter 0", dot.participant));
        }
        if !covers(entries, dot) {
            return Err(format!(
                "frontier dot ({}, {}) is not covered by the summary",
                dot.participant, dot.counter
            ));
        }
        if contains(&frontier[..i], dot) {
            return Err(format!("frontier dot ({}, {}) repeated", dot.participant, dot.counter));
        }
    }
    Ok(())
}

/// Frontier of the union of two observation sets.
fn join_frontiers(
    local_summary: &[ChainEntry],
    local_frontier: &[ChainEntry],
    peer_summary: &[ChainEntry],
    peer_frontier: &[ChainEntry],
) -> Vec<ChainEntry> {
    let mut frontier: Vec<ChainEntry> = local_frontier
        .iter()
        .filter(|dot| !covers(peer_summary, dot) || contains(peer_frontier, dot))
        .copied()
        .collect();
    for dot in peer_frontier {
        let dominated = covers(local_summary, dot) && !contains(local_frontier, dot);
        if !dominated && !contains(&frontier, dot) {
            frontier.push(*dot);
        }
    }
    frontier
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntichainChainClock {
    pub uuid: NodeId,
    index: u32,
    pub entries: Vec<ChainEntry>,
    pub frontier: Vec<ChainEntry>,
}

impl AntichainChainClock {
    /// Position of this node's own entry.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Dots of the writes not yet reconciled by a later event.
    pub fn frontier(&self) -> &[ChainEntry] {
        &self.frontier
    }

    /// Whether the frontier holds more than one concurrent write.
    pub fn has_concurrent_writes(&self) -> bool {
        self.frontier.len() > 1
    }
}

impl Clock for AntichainChainClock {
    type Timestamp = AntichainTimestamp;
    type Options = AntichainOptions;

    fn setup(options: AntichainOptions) -> Result<Self, ClockError> {
        let uuid = options.uuid.unwrap_or_else(NodeId::generate);
        let (entries, index) = seed_entries(uuid, options.counter, options.entries)?;
        // Nothing is known about how the seeded counters relate, so each non-zero one
        // starts out as its own tip.
        let frontier = entries.iter().filter(|e| e.counter > 0).copied().collect();
        Ok(AntichainChainClock {
            uuid,
            index,
            entries,
            frontier,
        })
    }

    /// A local event has observed everything, so the candidate frontier is the new dot
    /// alone.
    fn advance(&self, delta: Option<u32>) -> Result<AntichainTimestamp, ClockError> {
        let delta = delta.unwrap_or(1);
        if delta == 0 {
            return Ok(self.read());
        }
        let mut entries = self.entries.clone();
        let own = own_slot(&mut entries, self.index)?;
        own.counter = own
            .counter
            .checked_add(delta)
            .ok_or_else(|| ClockError::InvalidInput(format!("delta {} overflows own entry", delta)))?;
        let dot = *own;
        Ok(AntichainTimestamp {
            uuid: self.uuid,
            entries,
            frontier: vec![dot],
        })
    }

    fn read(&self) -> AntichainTimestamp {
        AntichainTimestamp {
            uuid: self.uuid,
            entries: self.entries.clone(),
            frontier: self.frontier.clone(),
        }
    }

    fn update(&mut self, timestamp: Option<&AntichainTimestamp>) -> Result<&mut Self, ClockError> {
        let Some(ts) = timestamp else {
            return Ok(self);
        };

        if let Err(reason) = check_shape(&ts.uuid, &ts.entries, &ts.frontier) {
            tracing::warn!("Rejecting antichain update from {}: {}", ts.uuid, reason);
            return Err(ClockError::ShapeMismatch(reason));
        }

        let frontier = join_frontiers(&self.entries, &self.frontier, &ts.entries, &ts.frontier);
        if frontier.len() > 1 {
            tracing::debug!("Antichain frontier holds {} concurrent dots", frontier.len());
        }
        merge_entries(&mut self.entries, &ts.entries);
        self.frontier = frontier;
        Ok(self)
    }

    fn are_incomparable(ts1: &AntichainTimestamp, ts2: &AntichainTimestamp) -> Result<bool, ClockError> {
        ts1.validate()?;
        ts2.validate()?;
        Ok(!shares_participant(
            ts1.entries.iter().map(|e| &e.participant),
            ts2.entries.iter().map(|e| &e.participant),
        ))
    }

    fn happens_before(ts1: &AntichainTimestamp, ts2: &AntichainTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(compare(as_counts(&ts1.entries), as_counts(&ts2.entries)) == PartialOrder::LessThan)
    }

    fn are_concurrent(ts1: &AntichainTimestamp, ts2: &AntichainTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(matches!(
            compare(as_counts(&ts1.entries), as_counts(&ts2.entries)),
            PartialOrder::Concurrent | PartialOrder::Equal
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(HEADER_LEN + ENTRY_LEN * (self.entries.len() + self.frontier.len()));
        wire::put_node_id(&mut buf, &self.uuid);
        wire::put_u32(&mut buf, self.index);
        // Entry counts are bounded by the u32 index space.
        wire::put_u32(&mut buf, self.entries.len() as u32);
        put_entries(&mut buf, &self.entries);
        put_entries(&mut buf, &self.frontier);
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, ClockError> {
        let total = wire::slot_count(data, HEADER_LEN, ENTRY_LEN, 1, "AntichainChainClock")?;
        let mut reader = Reader::new(data, "AntichainChainClock");
        let uuid = reader.node_id()?;
        let index = reader.u32()?;
        let summary_len = reader.u32()? as usize;
        if summary_len == 0 || summary_len > total {
            return Err(reader.error(format!(
                "summary count {} does not fit {} packed entries",
                summary_len, total
            )));
        }
        let entries = read_entries(&mut reader, summary_len)?;
        let frontier = read_entries(&mut reader, total - summary_len)?;

        if position_of(entries.iter().map(|e| &e.participant), &uuid) != Some(index as usize) {
            return Err(reader.error(format!("index {} does not point at the own entry", index)));
        }
        if let Err(reason) = check_shape(&uuid, &entries, &frontier) {
            return Err(reader.error(reason));
        }
        reader.finish()?;
        Ok(AntichainChainClock {
            uuid,
            index,
            entries,
            frontier,
        })
    }
}

impl ChainClock for AntichainChainClock {
    fn participants(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.participant).collect()
    }

    fn counter_of(&self, participant: &NodeId) -> Option<u64> {
        position_of(self.entries.iter().map(|e| &e.participant), participant)
            .map(|i| u64::from(self.entries[i].counter))
    }
}
