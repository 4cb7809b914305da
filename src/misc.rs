//!
//! Helpers that sit beside the clocks: timing-safe byte comparison, a debug renderer
//! for byte-heavy values and a bounded FIFO callers use to batch updates.
//! None of this is on the causal path except `bytes_are_same`.

use crate::error::ClockError;
use std::collections::VecDeque;
use subtle::ConstantTimeEq;

/// XORs two equal-length byte strings together.
pub fn xor(b1: &[u8], b2: &[u8]) -> Result<Vec<u8>, ClockError> {
    if b1.len() != b2.len() {
        return Err(ClockError::InvalidInput(format!(
            "xor operands differ in length ({} vs {})",
            b1.len(),
            b2.len()
        )));
    }
    Ok(b1.iter().zip(b2).map(|(a, b)| a ^ b).collect())
}

/// Timing-attack safe bytes comparison. Only the length check short-circuits.
#[inline]
pub fn bytes_are_same(b1: &[u8], b2: &[u8]) -> bool {
    b1.len() == b2.len() && bool::from(b1.ct_eq(b2))
}

/// Whether every byte is a displayable ASCII char.
pub fn all_ascii(data: &[u8]) -> bool {
    data.iter().all(|c| (32..=126).contains(c))
}

/// A loosely typed value for diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DebugValue {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<DebugValue>),
    Tuple(Vec<DebugValue>),
    /// Keyed entries, kept in insertion order.
    Map(Vec<(DebugValue, DebugValue)>),
}

/// Converts non-printable byte strings to hex text, recursing through lists, tuples
/// and both the keys and values of maps. Everything else is returned unchanged.
pub fn hexify(data: DebugValue) -> DebugValue {
    match data {
        DebugValue::Bytes(bytes) if !all_ascii(&bytes) => DebugValue::Str(hex::encode(bytes)),
        DebugValue::List(items) => DebugValue::List(items.into_iter().map(hexify).collect()),
        DebugValue::Tuple(items) => DebugValue::Tuple(items.into_iter().map(hexify).collect()),
        DebugValue::Map(entries) => DebugValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (hexify(k), hexify(v)))
                .collect(),
        ),
        other => other,
    }
}

const DEFAULT_QUEUE_SIZE: usize = 10;

/// FIFO with sliding-window retention: once `size` is exceeded the oldest items are
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoundedQueue<T> {
    pub size: usize,
    items: VecDeque<T>,
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(size: usize) -> Self {
        BoundedQueue {
            size,
            items: VecDeque::with_capacity(size),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns a copy of the current values, oldest first.
    pub fn read(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }

    /// Returns the oldest value without removing it.
    pub fn get(&self) -> Option<&T> {
        self.items.front()
    }

    /// Removes the oldest value and returns it.
    pub fn take(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes `number` contiguous items starting at `index`, in insertion order.
    pub fn remove(&mut self, index: usize, number: usize) -> Result<(), ClockError> {
        let end = index.checked_add(number).filter(|end| *end <= self.items.len());
        match end {
            Some(end) => {
                self.items.drain(index..end);
                Ok(())
            }
            None => Err(ClockError::InvalidInput(format!(
                "cannot remove {} items at {}: queue holds {}",
                number,
                index,
                self.items.len()
            ))),
        }
    }

    /// Appends an item, kicking out the oldest if necessary.
    pub fn append(&mut self, item: T) {
        self.items.push_back(item);
        self.trim();
    }

    /// Extends with items, kicking out the oldest if necessary.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        self.items.extend(items);
        self.trim();
    }

    fn trim(&mut self) {
        while self.items.len() > self.size {
            self.items.pop_front();
        }
    }
}
