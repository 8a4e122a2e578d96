//! Hash-slot arithmetic
//!
//! Redis routes every key to one of 16384 slots via CRC16-XMODEM of the
//! key (or of its `{…}` hash-tag when present) taken mod 16384. The CRC
//! here is streamable so composite keys can be hashed piecewise without
//! concatenating them first.

use std::cmp::Ordering;

use crate::store::StorageId;
use crate::utils::{Result, StoreError};

/// Total number of hash slots in a Redis cluster.
pub const SLOT_COUNT: u16 = 16384;

/// Fold `data` into a running CRC16-XMODEM value.
///
/// Polynomial 0x1021, initial value 0, no reflection, no final xor.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC16-XMODEM of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0, data)
}

/// Hash slot of a raw Redis key, honouring the hash-tag convention:
/// when the key contains `{…}` with a non-empty body, only the body is
/// hashed, so keys sharing a tag collocate.
pub fn slot_for_key(key: &[u8]) -> u16 {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(close) = key[open + 1..].iter().position(|&b| b == b'}') {
            if close > 0 {
                return crc16(&key[open + 1..open + 1 + close]) % SLOT_COUNT;
            }
        }
    }
    crc16(key) % SLOT_COUNT
}

/// Inclusive hash-slot interval `[start, end]` owned by one node.
///
/// Totally ordered lexicographically by `(start, end)`, and comparable
/// against a [`StorageId`] through its slot projection so an ordered
/// range map can be probed without building a synthetic range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotRange {
    start: u16,
    end: u16,
}

impl SlotRange {
    /// Build a range, rejecting inverted or out-of-bounds intervals.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start < 0 || end < start || end >= SLOT_COUNT as i64 {
            return Err(StoreError::Protocol(format!(
                "invalid hash-slot range {}-{}",
                start, end
            )));
        }
        Ok(Self {
            start: start as u16,
            end: end as u16,
        })
    }

    pub fn from(&self) -> u16 {
        self.start
    }

    pub fn to(&self) -> u16 {
        self.end
    }

    pub fn contains(&self, slot: u16) -> bool {
        self.start <= slot && slot <= self.end
    }

    /// Where this range sits relative to a slot: `Greater` when the
    /// whole range lies above the slot, `Less` when below, `Equal` when
    /// the slot falls inside.
    pub fn compare_slot(&self, slot: u16) -> Ordering {
        if slot < self.start {
            Ordering::Greater
        } else if slot > self.end {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }
}

impl PartialEq<StorageId> for SlotRange {
    fn eq(&self, id: &StorageId) -> bool {
        self.contains(id.slot())
    }
}

impl PartialOrd<StorageId> for SlotRange {
    fn partial_cmp(&self, id: &StorageId) -> Option<Ordering> {
        Some(self.compare_slot(id.slot()))
    }
}

impl PartialEq<SlotRange> for StorageId {
    fn eq(&self, range: &SlotRange) -> bool {
        range.contains(self.slot())
    }
}

impl PartialOrd<SlotRange> for StorageId {
    fn partial_cmp(&self, range: &SlotRange) -> Option<Ordering> {
        Some(range.compare_slot(self.slot()).reverse())
    }
}
