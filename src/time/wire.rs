//! Big-endian reading and writing shared by the `pack`/`unpack` implementations.

use crate::error::ClockError;
use crate::types::{NodeId, NODE_ID_LEN};

/// Cursor over a packed clock. Every short read is a `DecodeError`.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Reader { data, pos: 0, what }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClockError> {
        if self.remaining() < n {
            return Err(self.error(format!(
                "truncated at byte {}: need {} more, have {}",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ClockError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn node_id(&mut self) -> Result<NodeId, ClockError> {
        Ok(NodeId(self.take_array::<NODE_ID_LEN>()?))
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ClockError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ClockError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ClockError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Fails when bytes are left over.
    pub(crate) fn finish(self) -> Result<(), ClockError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(self.error(format!("{} trailing bytes", n))),
        }
    }

    pub(crate) fn error(&self, detail: String) -> ClockError {
        tracing::warn!("Failed to unpack {}: {}", self.what, detail);
        ClockError::DecodeError(format!("{}: {}", self.what, detail))
    }
}

pub(crate) fn put_node_id(buf: &mut Vec<u8>, id: &NodeId) {
    buf.extend_from_slice(&id.0);
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Checks that a buffer is a fixed header plus a whole number of fixed-size slots, and
/// returns the slot count.
pub(crate) fn slot_count(
    data: &[u8],
    header: usize,
    slot: usize,
    min_slots: usize,
    what: &'static str,
) -> Result<usize, ClockError> {
    let reader = Reader::new(data, what);
    if data.len() < header + slot * min_slots {
        return Err(reader.error(format!(
            "need at least {} bytes, got {}",
            header + slot * min_slots,
            data.len()
        )));
    }
    if (data.len() - header) % slot != 0 {
        return Err(reader.error(format!(
            "{} bytes after the {}-byte header is not a multiple of {}",
            data.len() - header,
            header,
            slot
        )));
    }
    Ok((data.len() - header) / slot)
}
