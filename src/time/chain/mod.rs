//! Chain clocks: vector clocks whose dimensions are discovered rather than agreed on.
//!
//! State is an ordered sequence of `(participant, counter)` entries, one per node ever
//! observed, appended to (never reordered) as new participants show up. Comparison runs
//! over the union of both sides' participants with absent entries counting as zero,
//! and two timestamps are incomparable only when they share no participant at all.
//!
//! - [`DynamicChainClock`]: participant-keyed maximum merge.
//! - [`AntichainChainClock`]: additionally tracks the frontier of concurrent writes.
//! - [`VariableChainClock`]: per-participant counter widths, validated on merge.
//!
//! Unlike the vector clock, a chain merge does not tick the local entry, so applying
//! the same timestamp twice is a no-op.

pub mod antichain;
pub mod dynamic;
pub mod variable;

pub use antichain::{AntichainChainClock, AntichainOptions, AntichainTimestamp};
pub use dynamic::{ChainOptions, ChainTimestamp, DynamicChainClock};
pub use variable::{CounterWidth, VariableChainClock, VariableEntry, VariableOptions, VariableTimestamp};

use crate::error::ClockError;
use crate::time::vector::PartialOrder;
use crate::time::wire::{self, Reader};
use crate::types::{NodeId, NODE_ID_LEN};

/// Packed size of one [`ChainEntry`].
pub(crate) const ENTRY_LEN: usize = NODE_ID_LEN + 4;

/// One participant's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChainEntry {
    pub participant: NodeId,
    pub counter: u32,
}

impl ChainEntry {
    pub fn new(participant: NodeId, counter: u32) -> Self {
        ChainEntry { participant, counter }
    }
}

/// Counter recorded for `participant`, zero when absent. Keys are matched with
/// [`NodeId::same_as`].
fn counter_for(counts: &[(NodeId, u64)], participant: &NodeId) -> u64 {
    counts
        .iter()
        .find(|(id, _)| id.same_as(participant))
        .map(|(_, counter)| *counter)
        .unwrap_or(0)
}

/// Compares two participant-keyed counter sets over the union of their keys.
pub fn compare<I, J>(a: I, b: J) -> PartialOrder
where
    I: IntoIterator<Item = (NodeId, u64)>,
    J: IntoIterator<Item = (NodeId, u64)>,
{
    let a: Vec<(NodeId, u64)> = a.into_iter().collect();
    let b: Vec<(NodeId, u64)> = b.into_iter().collect();

    let mut a_le_b = true;
    let mut b_le_a = true;

    let pairs = a
        .iter()
        .map(|(key, val1)| (*val1, counter_for(&b, key)))
        .chain(b.iter().map(|(key, val2)| (counter_for(&a, key), *val2)));

    for (val1, val2) in pairs {
        if val1 > val2 {
            a_le_b = false;
        }
        if val1 < val2 {
            b_le_a = false;
        }
    }
    PartialOrder::from_bounds(a_le_b, b_le_a)
}

/// Whether the two participant lists have any id in common.
pub(crate) fn shares_participant<'a, I, J>(a: I, b: J) -> bool
where
    I: IntoIterator<Item = &'a NodeId>,
    J: IntoIterator<Item = &'a NodeId>,
{
    let a: Vec<&NodeId> = a.into_iter().collect();
    b.into_iter().any(|id| a.iter().any(|other| other.same_as(id)))
}

pub(crate) fn first_duplicate<'a, I>(ids: I) -> Option<NodeId>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    let ids: Vec<&NodeId> = ids.into_iter().collect();
    (0..ids.len())
        .find(|&i| ids[..i].iter().any(|earlier| earlier.same_as(ids[i])))
        .map(|i| *ids[i])
}

pub(crate) fn position_of<'a, I>(ids: I, participant: &NodeId) -> Option<usize>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    ids.into_iter().position(|id| id.same_as(participant))
}

/// Structural rules for a chain payload: unique participants and an entry for the
/// emitting node. Returns a description of the first violation.
pub(crate) fn check_entries(uuid: &NodeId, entries: &[ChainEntry]) -> Result<(), String> {
    if let Some(dup) = first_duplicate(entries.iter().map(|e| &e.participant)) {
        return Err(format!("participant {} appears more than once", dup));
    }
    if position_of(entries.iter().map(|e| &e.participant), uuid).is_none() {
        return Err(format!("no entry for emitting node {}", uuid));
    }
    Ok(())
}

/// Participant-keyed maximum. Unseen participants are appended in the peer's order.
pub(crate) fn merge_entries(local: &mut Vec<ChainEntry>, peer: &[ChainEntry]) {
    for entry in peer {
        match position_of(local.iter().map(|e| &e.participant), &entry.participant) {
            Some(i) => local[i].counter = local[i].counter.max(entry.counter),
            None => {
                tracing::debug!("Chain clock learned participant {}", entry.participant);
                local.push(*entry);
            }
        }
    }
}

/// Sets up the entry list for a new chain clock, returning it with the own index.
pub(crate) fn seed_entries(
    uuid: NodeId,
    counter: u32,
    mut entries: Vec<ChainEntry>,
) -> Result<(Vec<ChainEntry>, u32), ClockError> {
    if let Some(dup) = first_duplicate(entries.iter().map(|e| &e.participant)) {
        return Err(ClockError::InvalidInput(format!("participant {} listed twice", dup)));
    }
    let index = match position_of(entries.iter().map(|e| &e.participant), &uuid) {
        Some(i) => {
            entries[i].counter = entries[i].counter.max(counter);
            i
        }
        None => {
            entries.push(ChainEntry::new(uuid, counter));
            entries.len() - 1
        }
    };
    let index = u32::try_from(index)
        .map_err(|_| ClockError::InvalidInput("too many participants".into()))?;
    Ok((entries, index))
}

pub(crate) fn as_counts(entries: &[ChainEntry]) -> impl Iterator<Item = (NodeId, u64)> + '_ {
    entries.iter().map(|e| (e.participant, u64::from(e.counter)))
}

pub(crate) fn put_entries(buf: &mut Vec<u8>, entries: &[ChainEntry]) {
    for entry in entries {
        wire::put_node_id(buf, &entry.participant);
        wire::put_u32(buf, entry.counter);
    }
}

pub(crate) fn read_entries(reader: &mut Reader<'_>, count: usize) -> Result<Vec<ChainEntry>, ClockError> {
    (0..count)
        .map(|_| -> Result<ChainEntry, ClockError> {
            Ok(ChainEntry {
                participant: reader.node_id()?,
                counter: reader.u32()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> NodeId {
        NodeId([n; 16])
    }

    #[test]
    fn test_compare_with_missing_entries() {
        let vc1: Vec<(NodeId, u64)> = vec![(id(1), 1)];
        let vc2: Vec<(NodeId, u64)> = vec![(id(1), 1), (id(2), 1)];
        assert_eq!(compare(vc1.clone(), vc2.clone()), PartialOrder::LessThan);
        assert_eq!(compare(vc2.clone(), vc1), PartialOrder::GreaterThan);

        let vc3: Vec<(NodeId, u64)> = vec![(id(1), 2)];
        assert_eq!(compare(vc3, vc2), PartialOrder::Concurrent);

        let zero: Vec<(NodeId, u64)> = vec![(id(1), 1), (id(3), 0)];
        assert_eq!(compare(zero, vec![(id(1), 1u64)]), PartialOrder::Equal);
    }

    #[test]
    fn test_merge_appends_unseen_in_order() {
        let mut local = vec![ChainEntry::new(id(1), 3)];
        merge_entries(
            &mut local,
            &[ChainEntry::new(id(2), 5), ChainEntry::new(id(1), 1), ChainEntry::new(id(3), 2)],
        );
        assert_eq!(
            local,
            vec![ChainEntry::new(id(1), 3), ChainEntry::new(id(2), 5), ChainEntry::new(id(3), 2)]
        );
    }

    #[test]
    fn test_check_entries() {
        let ok = [ChainEntry::new(id(1), 0), ChainEntry::new(id(2), 1)];
        assert!(check_entries(&id(2), &ok).is_ok());
        assert!(check_entries(&id(3), &ok).is_err());
        let dup = [ChainEntry::new(id(1), 0), ChainEntry::new(id(1), 1)];
        assert!(check_entries(&id(1), &dup).is_err());
    }

    #[test]
    fn test_seed_entries() {
        let (entries, index) = seed_entries(id(2), 4, vec![ChainEntry::new(id(1), 1)]).unwrap();
        assert_eq!(index, 1);
        assert_eq!(entries[1], ChainEntry::new(id(2), 4));

        let (entries, index) = seed_entries(id(1), 0, vec![ChainEntry::new(id(1), 6)]).unwrap();
        assert_eq!((entries.len(), index, entries[0].counter), (1, 0, 6));

        let dup = seed_entries(id(1), 0, vec![ChainEntry::new(id(2), 0), ChainEntry::new(id(2), 1)]);
        assert!(matches!(dup, Err(ClockError::InvalidInput(_))));
    }

    #[test]
    fn test_first_duplicate_reports_the_repeat() {
        let ids = [id(1), id(2), id(3), id(2), id(1)];
        assert_eq!(first_duplicate(&ids), Some(id(2)));
        assert_eq!(first_duplicate(&[id(1), id(2)]), None);
        assert_eq!(first_duplicate(&[]), None);
    }

    #[test]
    fn test_compare_ignores_entry_order() {
        let vc1: Vec<(NodeId, u64)> = vec![(id(1), 2), (id(2), 0), (id(3), 1)];
        let vc2: Vec<(NodeId, u64)> = vec![(id(3), 1), (id(1), 2)];
        assert_eq!(compare(vc1.clone(), vc2.clone()), PartialOrder::Equal);
        let vc3: Vec<(NodeId, u64)> = vec![(id(2), 1), (id(3), 1), (id(1), 2)];
        assert_eq!(compare(vc2, vc3), PartialOrder::LessThan);
    }

    #[test]
    fn test_shares_participant() {
        let a = [id(1), id(2)];
        let b = [id(3), id(2)];
        let c = [id(4)];
        assert!(shares_participant(&a, &b));
        assert!(!shares_participant(&a, &c));
    }
}
