//! Hybrid logical clock with cluster offset synchronization.
//!
//! A timestamp is `(L, C)`: `L` is the largest physical reading (milliseconds since the
//! Unix epoch) this node has heard of, `C` counts causally related events that share the
//! same `L`. Pairs compare lexicographically.
//!
//! - **Local event**: `L' = max(L, PT)`; `C' = C + 1` if `L' == L`, else `0`.
//! - **Receive `m`**: `L' = max(L, L_m, PT)`; `C'` is
//!     - `1 + max(C, C_m)` if `L' == L == L_m`,
//!     - `1 + C` if only `L' == L`,
//!     - `1 + C_m` if only `L' == L_m`,
//!     - `0` otherwise.
//!
//! `PT` is the time source reading corrected by an offset that
//! [`HybridTime::synchronize`] steers toward the peers' median skew, so a node whose
//! wall clock lags the cluster is pulled forward without ever moving `L` backwards.
//! Round trips fed to [`HybridTime::calculate_offset`] are measured against the raw
//! time source, so repeated rounds converge on the skew instead of adding it again.

use crate::clock_traits::{Clock, HybridTime, RoundTrip};
use crate::error::ClockError;
use crate::time::wire::{self, Reader};
use crate::types::{NodeId, NODE_ID_LEN};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Packed size: identity, `u64` physical time and `u32` logical counter.
pub const HYBRID_PACKED_LEN: usize = NODE_ID_LEN + 8 + 4;

/// Largest step a single `synchronize` call applies unless configured otherwise.
pub const DEFAULT_MAX_ADJUSTMENT_MS: u64 = 1_000;

/// Source of physical time readings, in milliseconds since the Unix epoch.
pub trait TimeSource: Clone + fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// Reads the operating system's wall clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        // A wall clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// A time source driven by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(now_ms: u64) -> Self {
        ManualTimeSource {
            now: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HybridTimestamp {
    pub uuid: NodeId,
    pub physical: u64,
    pub logical: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HybridOptions {
    pub uuid: Option<NodeId>,
    pub physical: u64,
    pub logical: u32,
    /// Cap on how far one `synchronize` call may shift the offset, in milliseconds.
    pub max_adjustment: u64,
}

impl Default for HybridOptions {
    fn default() -> Self {
        HybridOptions {
            uuid: None,
            physical: 0,
            logical: 0,
            max_adjustment: DEFAULT_MAX_ADJUSTMENT_MS,
        }
    }
}

/// Equality compares the packed state only: identity, physical and logical.
#[derive(Debug, Clone)]
pub struct HybridClock<T: TimeSource = SystemTimeSource> {
    pub uuid: NodeId,
    pub physical: u64,
    pub logical: u32,
    offset: i64,
    max_adjustment: u64,
    time_source: T,
}

impl<T: TimeSource> PartialEq for HybridClock<T> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid.same_as(&other.uuid) && self.physical == other.physical && self.logical == other.logical
    }
}

impl<T: TimeSource> Eq for HybridClock<T> {}

fn apply_offset(now: u64, offset: i64) -> u64 {
    if offset >= 0 {
        now.saturating_add(offset.unsigned_abs())
    } else {
        now.saturating_sub(offset.unsigned_abs())
    }
}

fn clamp_to_i64(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Median of `values`; the mean of the two middle values (floored) for even counts.
fn median(values: &[i64]) -> Option<i64> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[mid]),
        _ => Some(clamp_to_i64(
            (i128::from(sorted[mid - 1]) + i128::from(sorted[mid])).div_euclid(2),
        )),
    }
}

/// Next `(L, C)` after ticking the logical counter at `physical`. An exhausted counter
/// pushes the physical component one millisecond ahead instead.
fn tick(physical: u64, logical: Option<u32>) -> Result<(u64, u32), ClockError> {
    match logical {
        Some(logical) => Ok((physical, logical)),
        None => physical
            .checked_add(1)
            .map(|p| (p, 0))
            .ok_or_else(|| ClockError::Overflow("physical component is at u64::MAX".into())),
    }
}

impl<T: TimeSource> HybridClock<T> {
    /// Builds a clock reading physical time from `time_source`.
    pub fn with_time_source(options: HybridOptions, time_source: T) -> Self {
        HybridClock {
            uuid: options.uuid.unwrap_or_else(NodeId::generate),
            physical: options.physical,
            logical: options.logical,
            offset: 0,
            max_adjustment: options.max_adjustment,
            time_source,
        }
    }

    /// Correction currently applied to the time source, in milliseconds.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn time_source(&self) -> &T {
        &self.time_source
    }

    fn corrected_now(&self) -> u64 {
        apply_offset(self.time_source.now_ms(), self.offset)
    }
}

impl<T: TimeSource + Default> Clock for HybridClock<T> {
    type Timestamp = HybridTimestamp;
    type Options = HybridOptions;

    fn setup(options: HybridOptions) -> Result<Self, ClockError> {
        Ok(Self::with_time_source(options, T::default()))
    }

    /// `delta` is the number of logical ticks taken when physical time has not moved.
    fn advance(&self, delta: Option<u32>) -> Result<HybridTimestamp, ClockError> {
        let delta = delta.unwrap_or(1);
        if delta == 0 {
            return Err(ClockError::InvalidInput("hybrid clock cannot advance by 0".into()));
        }

        let pt = self.corrected_now().max(self.physical);
        let (physical, logical) = if pt == self.physical {
            tick(pt, self.logical.checked_add(delta))
                .map_err(|e| ClockError::InvalidInput(e.to_string()))?
        } else {
            (pt, 0)
        };

        Ok(HybridTimestamp {
            uuid: self.uuid,
            physical,
            logical,
        })
    }

    fn read(&self) -> HybridTimestamp {
        HybridTimestamp {
            uuid: self.uuid,
            physical: self.physical,
            logical: self.logical,
        }
    }

    /// Merges from any node; the HLC receive rule is sound across identities.
    fn update(&mut self, timestamp: Option<&HybridTimestamp>) -> Result<&mut Self, ClockError> {
        let Some(ts) = timestamp else {
            return Ok(self);
        };

        if !ts.uuid.same_as(&self.uuid) {
            tracing::debug!(
                "Merging hybrid timestamp ({}, {}) from {}",
                ts.physical,
                ts.logical,
                ts.uuid
            );
        }

        let prev = self.physical;
        let l = prev.max(ts.physical).max(self.corrected_now());
        let c = match (l == prev, l == ts.physical) {
            (true, true) => self.logical.max(ts.logical).checked_add(1),
            (true, false) => self.logical.checked_add(1),
            (false, true) => ts.logical.checked_add(1),
            (false, false) => Some(0),
        };

        let (physical, logical) = tick(l, c)?;
        self.physical = physical;
        self.logical = logical;
        Ok(self)
    }

    fn are_incomparable(ts1: &HybridTimestamp, ts2: &HybridTimestamp) -> Result<bool, ClockError> {
        Ok(!ts1.uuid.same_as(&ts2.uuid))
    }

    fn happens_before(ts1: &HybridTimestamp, ts2: &HybridTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok((ts1.physical, ts1.logical) < (ts2.physical, ts2.logical))
    }

    fn are_concurrent(ts1: &HybridTimestamp, ts2: &HybridTimestamp) -> Result<bool, ClockError> {
        if Self::are_incomparable(ts1, ts2)? {
            return Ok(false);
        }
        Ok(ts1.physical == ts2.physical && ts1.logical == ts2.logical)
    }

    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HYBRID_PACKED_LEN);
        wire::put_node_id(&mut buf, &self.uuid);
        wire::put_u64(&mut buf, self.physical);
        wire::put_u32(&mut buf, self.logical);
        buf
    }

    fn unpack(data: &[u8]) -> Result<Self, ClockError> {
        let mut reader = Reader::new(data, "HybridClock");
        if data.len() != HYBRID_PACKED_LEN {
            return Err(reader.error(format!(
                "expected {} bytes, got {}",
                HYBRID_PACKED_LEN,
                data.len()
            )));
        }
        let options = HybridOptions {
            uuid: Some(reader.node_id()?),
            physical: reader.u64()?,
            logical: reader.u32()?,
            ..Default::default()
        };
        reader.finish()?;
        Ok(Self::with_time_source(options, T::default()))
    }
}

impl<T: TimeSource + Default> HybridTime for HybridClock<T> {
    fn calculate_offset(observations: &[RoundTrip]) -> Vec<i64> {
        observations
            .iter()
            .map(|o| {
                let outbound = i128::from(o.peer_received) - i128::from(o.local_sent);
                let inbound = i128::from(o.peer_sent) - i128::from(o.local_received);
                clamp_to_i64((outbound + inbound).div_euclid(2))
            })
            .collect()
    }

    /// Steps the offset toward the median raw skew, by at most the configured maximum
    /// adjustment, and lets the physical component catch up if the corrected reading
    /// is now ahead of it.
    fn synchronize(&mut self, offsets: &[i64]) -> &mut Self {
        let Some(median) = median(offsets) else {
            tracing::debug!("No peer offsets to synchronize against");
            return self;
        };

        let max = i64::try_from(self.max_adjustment).unwrap_or(i64::MAX);
        let step = median.saturating_sub(self.offset).clamp(-max, max);
        self.offset = self.offset.saturating_add(step);

        let now = self.corrected_now();
        if now > self.physical {
            self.physical = now;
            self.logical = 0;
        }
        tracing::debug!(
            "Synchronized against {} peers: median {} ms, applied {} ms, offset now {} ms",
            offsets.len(),
            median,
            step,
            self.offset
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: NodeId = NodeId([1u8; 16]);

    fn clock_at(now: u64) -> (HybridClock<ManualTimeSource>, ManualTimeSource) {
        let source = ManualTimeSource::new(now);
        let clock = HybridClock::with_time_source(
            HybridOptions {
                uuid: Some(ID),
                ..Default::default()
            },
            source.clone(),
        );
        (clock, source)
    }

    fn ts(physical: u64, logical: u32) -> HybridTimestamp {
        HybridTimestamp {
            uuid: ID,
            physical,
            logical,
        }
    }

    #[test]
    fn test_advance_resets_logical_when_time_moves() {
        let (mut clock, source) = clock_at(100);
        assert_eq!(clock.advance(None).unwrap(), ts(100, 0));
        let next = clock.advance(None).unwrap();
        clock.update(Some(&next)).unwrap();
        assert_eq!(clock.read(), ts(100, 1));

        assert_eq!(clock.advance(Some(3)).unwrap(), ts(100, 4));
        source.advance(5);
        assert_eq!(clock.advance(None).unwrap(), ts(105, 0));
    }

    #[test]
    fn test_advance_rejects_zero_and_rolls_exhausted_counter() {
        let (mut clock, _) = clock_at(10);
        assert!(matches!(clock.advance(Some(0)), Err(ClockError::InvalidInput(_))));

        clock.physical = 10;
        clock.logical = u32::MAX;
        assert_eq!(clock.advance(None).unwrap(), ts(11, 0));
    }

    #[test]
    fn test_update_receive_rules() {
        let (mut clock, source) = clock_at(100);
        clock.physical = 100;
        clock.logical = 2;

        // Message ahead of both local state and wall clock.
        clock.update(Some(&ts(200, 7))).unwrap();
        assert_eq!(clock.read(), ts(200, 8));

        // Same L on both sides.
        clock.update(Some(&ts(200, 3))).unwrap();
        assert_eq!(clock.read(), ts(200, 9));

        // Stale message.
        clock.update(Some(&ts(50, 40))).unwrap();
        assert_eq!(clock.read(), ts(200, 10));

        // Wall clock overtakes everything.
        source.set(300);
        clock.update(Some(&ts(250, 1))).unwrap();
        assert_eq!(clock.read(), ts(300, 0));
    }

    #[test]
    fn test_update_merges_foreign_identity() {
        let (mut clock, _) = clock_at(0);
        let foreign = HybridTimestamp {
            uuid: NodeId([2u8; 16]),
            physical: 42,
            logical: 1,
        };
        clock.update(Some(&foreign)).unwrap();
        assert_eq!(clock.read(), ts(42, 2));
        clock.update(None).unwrap();
        assert_eq!(clock.read(), ts(42, 2));
    }

    #[test]
    fn test_predicates() {
        let other = HybridTimestamp {
            uuid: NodeId([2u8; 16]),
            physical: 1,
            logical: 0,
        };
        type C = HybridClock<ManualTimeSource>;
        assert!(C::happens_before(&ts(1, 5), &ts(2, 0)).unwrap());
        assert!(C::happens_before(&ts(1, 0), &ts(1, 1)).unwrap());
        assert!(!C::happens_before(&ts(1, 1), &ts(1, 1)).unwrap());
        assert!(C::are_concurrent(&ts(1, 1), &ts(1, 1)).unwrap());
        assert!(!C::are_concurrent(&ts(1, 1), &ts(1, 2)).unwrap());
        assert!(C::are_incomparable(&ts(1, 0), &other).unwrap());
        assert!(!C::happens_before(&ts(0, 0), &other).unwrap());
    }

    #[test]
    fn test_calculate_offset_cancels_symmetric_delay() {
        type C = HybridClock<ManualTimeSource>;
        // Peer is 50 ms ahead, one-way delay 10 ms each direction.
        let obs = RoundTrip {
            local_sent: 1_000,
            peer_received: 1_060,
            peer_sent: 1_070,
            local_received: 1_030,
        };
        let behind = RoundTrip::from((1_000, 960, 970, 1_030));
        assert_eq!(C::calculate_offset(&[obs, behind]), vec![50, -50]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[5, -3, 100]), Some(5));
        assert_eq!(median(&[1, 4, 2, 10]), Some(3));
        assert_eq!(median(&[-1, -2]), Some(-2));
    }

    #[test]
    fn test_synchronize_clamps_step() {
        let (mut clock, source) = clock_at(1_000);
        let now = clock.advance(None).unwrap();
        clock.update(Some(&now)).unwrap();
        assert_eq!(clock.read(), ts(1_000, 1));

        clock.synchronize(&[5_000, 4_000, 6_000]);
        assert_eq!(clock.offset(), DEFAULT_MAX_ADJUSTMENT_MS as i64);
        assert_eq!(clock.read(), ts(2_000, 0));

        source.advance(10);
        assert_eq!(clock.advance(None).unwrap(), ts(2_010, 0));
    }

    #[test]
    fn test_synchronize_converges_on_remeasured_skew() {
        let (mut clock, source) = clock_at(50_000);
        clock.max_adjustment = 150;
        let peer_skew = 400;

        for _ in 0..6 {
            // Peer answers instantly; the round trip is timed on the raw source.
            let sent = source.now_ms();
            let peer = sent + peer_skew;
            let offsets = HybridClock::<ManualTimeSource>::calculate_offset(&[RoundTrip::from((
                sent, peer, peer, sent,
            ))]);
            assert_eq!(offsets, vec![peer_skew as i64]);
            clock.synchronize(&offsets);
            assert!(clock.offset() <= peer_skew as i64);
            source.advance(100);
        }
        assert_eq!(clock.offset(), 400);
        assert_eq!(clock.advance(None).unwrap().physical, source.now_ms() + peer_skew);
    }

    #[test]
    fn test_synchronize_steps_back_toward_smaller_skew() {
        let (mut clock, _) = clock_at(10_000);
        clock.synchronize(&[800]);
        assert_eq!(clock.offset(), 800);
        clock.synchronize(&[500]);
        assert_eq!(clock.offset(), 500);
        assert_eq!(clock.read().physical, 10_800);
    }

    #[test]
    fn test_equality_ignores_offset_and_source() {
        let (mut a, _) = clock_at(0);
        let (b, _) = clock_at(9_999);
        a.synchronize(&[20]);
        a.physical = 0;
        assert_eq!(a, b);
        let other = HybridClock::with_time_source(
            HybridOptions {
                uuid: Some(NodeId([2u8; 16])),
                ..Default::default()
            },
            ManualTimeSource::new(0),
        );
        assert_ne!(a, other);
    }

    #[test]
    fn test_synchronize_never_moves_physical_back() {
        let (mut clock, _) = clock_at(1_000);
        clock.update(Some(&ts(1_000, 0))).unwrap();
        clock.synchronize(&[-300]);
        assert_eq!(clock.offset(), -300);
        assert_eq!(clock.read(), ts(1_000, 1));
        clock.synchronize(&[]);
        assert_eq!(clock.offset(), -300);
    }

    #[test]
    fn test_pack_layout() {
        let (mut clock, _) = clock_at(0);
        clock.physical = 0x0102_0304_0506_0708;
        clock.logical = 9;
        let packed = clock.pack();
        assert_eq!(packed.len(), 28);
        assert_eq!(&packed[16..24], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&packed[24..], &[0, 0, 0, 9]);
        assert_eq!(HybridClock::<ManualTimeSource>::unpack(&packed).unwrap(), clock);
        assert!(matches!(
            HybridClock::<ManualTimeSource>::unpack(&packed[..27]),
            Err(ClockError::DecodeError(_))
        ));
    }

    #[test]
    fn test_system_source_is_after_2020() {
        assert!(SystemTimeSource.now_ms() > 1_577_836_800_000);
    }
}
