//! Variable-width chain clock.
//!
//! Each participant declares the width of its counter (`u32` or `u64`), so a
//! long-lived, chatty node can use a wide counter without forcing every other entry
//! to pay for it. Widths are checked entry by entry when merging: a known participant
//! must keep the width it was first seen with.

use super::{compare, first_duplicate, position_of, shares_participant};
use crate::clock_traits::{ChainClock, Clock};
use crate::error::ClockError;
use crate::time::vector::{own_slot, PartialOrder};
use crate::time::wire::{self, Reader};
use crate::types::NodeId;

/// Width of a participant's counter. The discriminant is its packed byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum CounterWidth {
    #[default]
    U32 = 4,
    U64 = 8,
}

impl CounterWidth {
    pub fn max(self) -> u64 {
        match self {
            CounterWidth::U32 => u64::from(u32::MAX),
            CounterWidth::U64 => u64::MAX,
        }
    }

    pub fn fits(self, counter: u64) -> bool {
        counter <= self.max()
    }
}

impl TryFrom<u8> for CounterWidth {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(CounterWidth::U32),
            8 => Ok(CounterWidth::U64),
            _ => Err(format!("Invalid counter width tag: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VariableEntry {
    pub participant: NodeId,
    pub width: CounterWidth,
    pub counter: u64,
}

impl VariableEntry {
    pub fn new(participant: NodeId, width: CounterWidth, counter: u64) -> Self {
        VariableEntry {
            participant,
            width,
            counter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VariableTimestamp {
    pub uuid: NodeId,
    pub entries: Vec<VariableEntry>,
}

impl VariableTimestamp {
    fn validate(&self) -> Result<(), ClockError> {
        check_entries(&self.uuid, &self.entries).map_err(ClockError::MalformedTimestamp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VariableOptions {
    pub uuid: Option<NodeId>,
    /// Width of this node's own counter.
    pub width: CounterWidth,
    pub counter: u64,
    pub entries: Vec<VariableEntry>,
}

fn participants(entries: &[VariableEntry]) -> impl Iterator<Item = &NodeId> {
    entries.iter().map(|e| &e.participant)
}

fn counts(entries: &[VariableEntry]) -> impl Iterator<Item = (NodeId, u64)> + '_ {
    entries.iter().map(|e| (e.participant, e.counter))
}

fn check_widths(entries: &[VariableEntry]) -> Result<(), String> {
    match entries.iter().find(|e| !e.width.fits(e.counter)) {
        Some(e) => Err(format!(
            "counter {} of {} does not fit {:?}",
            e.counter, e.participant, e.width
        )),
        None => Ok(()),
    }
}

fn check_entries(uuid: &NodeId, entries: &[VariableEntry]) -> Result<(), String> {
    if let Some(dup) = first_duplicate(participants(entries)) {
        return Err(format!("participant {} appears more than once", dup));
    }
    if position_of(participants(entries), uuid).is_none() {
        return Err(format!("no entry for emitting node {}", uuid));
    }
    check_widths(entries)
}

/// First participant present in both lists with different widths.
fn width_conflict(a: &[VariableEntry], b: &[VariableEntry]) -> Option<(NodeId, CounterWidth, CounterWidth)> {
    a.iter().find_map(|x| {
        b.iter()
            .find(|y| y.participant.same_as(&x.participant) && y.width != x.width)
            .map(|y| (x.participant, x.width, y.width))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableChainClock {
    pub uuid: NodeId,
    index: u32,
    pub entries: Vec<VariableEntry>,
}

impl VariableChainClock {
    /// Position of this node's own entry.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Clock for VariableChainClock {
    type Timestamp = VariableTimestamp;
    type Options = VariableOptions;

    fn setup(options: VariableOptions) -> Result<Self, ClockError> {
        let uuid = options.uuid.unwrap_or_else(NodeId::generate);
        let mut entries = options.entries;

        if let Some(dup) = first_duplicate(participants(&entries)) {
            return Err(ClockError::InvalidInput(format!("participant {} listed twice", dup)));
        }
        let index = match position_of(participants(&entries), &uuid) {
            Some(i) if entries[i].width != options.width => {
                return Err(ClockError::InvalidInput(format!(
                    "own entry declared as {:?} but clock uses {:?}",
                    entries[i].width, options.width
                )));
            }
            Some(i) => {
                entries[i].counter = entries[i].counter.max(options.counter);
                i
            }
            None => {
                entries.push(VariableEntry::new(uuid, options.width, options.counter));
                entries.len() - 1
            }
        };
        check_widths(&entries).map_err(ClockError::InvalidInput)?;
        let index = u32::try_from(index)
            .map_err(|_| ClockError::InvalidInput("too many participants".into()))?;

        Ok(VariableChainClock { uuid, index, entries })
    }

    fn advance(&self, delta: Option<u32>) -> Result<VariableTimestamp, ClockError> {
        let delta = u64::from(delta.unwrap_or(1));
        let mut entries = self.entries.clone();
        let own = own_slot(&mut entries, self.index)?;
        let (width, current) = (own.width, own.counter);
        own.counter = current
            .checked_add(delta)
            .filter(|c| width.fits(*c))
            .ok_or_else(|| {
                ClockError::InvalidInput(format!(
                    "delta {} overflows own {:?} counter {}",
                    delta, width, current
                ))
            })?;
        Ok(VariableTimestamp {
            uuid: self.uuid,
            entries,
        })
    }

    fn read(&self) -> VariableTimestamp {
        VariableTimestamp {
            uuid: self.uuid,
            entries: self.entries.clone(),
        }
    }

    /// Validates every entry before touching local state, so a width conflict anywhere
    /// rejects the whole update.
    fn update(&mut self, timestamp: Option<&VariableTimestamp>) -> Result<&mut Self, ClockError> {
        let Some(ts) = timestamp else {
            return Ok(self);
        };

        let shape = check_entries(&ts.uuid, &ts.entries).and_then(|()| {
            match width_conflict(&self.entries, &ts.entries) {
                Some((participant, local, peer)) => Err(format!(
                    "participant {} is {:?} locally but {:?} in the update",
                    participant, local, peer
                )),
                None => Ok(()),
            }
        });
        if let Err(reason) = shape {
            tracing::warn!("Rejecting variable chain update from {}: {}", ts.uuid, reason);
            return Err(ClockError::ShapeMismatch(reason));
        }

        for entry in &ts.entries {
            match position_of(participants(&self.entries), &entry.participant) {
                Some(i) => self.entries[i].counter = self.entries[i].counter.max(entry.counter),
                None => {
                    tracing::debug!(
                        "Variable chain clock learned participant {} ({:?})",
                        entry.participant,
                        entry.width
                    );
                    self.entries.push(*entry);
                }
            }
        }
        Ok(self)
    }

    /// Incomparable when no participant is shared, or when a shared participant is
    /// declared with two different widths.
    fn are_incomparable(ts1: &VariableTimestamp, ts2: &VariableTimestamp) -> Result<bool, ClockError> {
        ts1.validate()?;
        ts2.validate()?;
        Ok(!shares_participant(participants(&ts1.entries), participants(&ts2.entries))
            || width_conflict(&ts1.entries, &ts2.entries).is_some())
    }

    fn happens_before(ts1: &VariableTimestamp, ts2: &VariableTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(compare(counts(&ts1.entries), counts(&ts2.entries)) == PartialOrder::LessThan)
    }

    fn are_concurrent(ts1: &VariableTimestamp, ts2: &VariableTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(matches!(
            compare(counts(&ts1.entries), counts(&ts2.entries)),
            PartialOrder::Concurrent | PartialOrder::Equal
        ))
    }

    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        wire::put_node_id(&mut buf, &self.uuid);
        wire::put_u32(&mut buf, self.index);
        for entry in &self.entries {
            wire::put_node_id(&mut buf, &entry.participant);
            buf.push(entry.width as u8);
            match entry.width {
                // Width was validated on every path that builds an entry.
                CounterWidth::U32 => wire::put_u32(&mut buf, entry.counter as u32),
                CounterWidth::U64 => wire::put_u64(&mut buf, entry.counter),
            }
        }
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, ClockError> {
        let mut reader = Reader::new(data, "VariableChainClock");
        let uuid = reader.node_id()?;
        let index = reader.u32()?;

        let mut entries = Vec::new();
        while reader.remaining() > 0 {
            let participant = reader.node_id()?;
            let width = CounterWidth::try_from(reader.u8()?).map_err(|e| reader.error(e))?;
            let counter = match width {
                CounterWidth::U32 => u64::from(reader.u32()?),
                CounterWidth::U64 => reader.u64()?,
            };
            entries.push(VariableEntry::new(participant, width, counter));
        }

        if position_of(participants(&entries), &uuid) != Some(index as usize) {
            return Err(reader.error(format!("index {} does not point at the own entry", index)));
        }
        if let Err(reason) = check_entries(&uuid, &entries) {
            return Err(reader.error(reason));
        }
        reader.finish()?;
        Ok(VariableChainClock { uuid, index, entries })
    }
}

impl ChainClock for VariableChainClock {
    fn participants(&self) -> Vec<NodeId> {
        participants(&self.entries).copied().collect()
    }

    fn counter_of(&self, participant: &NodeId) -> Option<u64> {
        position_of(participants(&self.entries), participant).map(|i| self.entries[i].counter)
    }
}
