//! Fixed-capacity TTL cache of disk sectors.
//!
//! Each entry remembers when it was inserted and how long it may live.
//! `cleanup` sweeps expired entries; when a full cache has nothing expired,
//! `add` evicts the oldest entry to make room. Only a zero-capacity cache
//! ever rejects an insert; the disk path treats that as a transient
//! failure and rolls back.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::DriverError;
use crate::storage::SECTOR_SIZE;

/// One cached sector: payload, 64-bit sector number as two halves, dirty
/// flag tracking an in-flight write.
pub struct SectorBuffer {
    pub data: [u8; SECTOR_SIZE],
    pub sector_low: u32,
    pub sector_high: u32,
    pub dirty: bool,
}

impl SectorBuffer {
    pub fn new(sector: u64) -> Self {
        Self {
            data: [0; SECTOR_SIZE],
            sector_low: sector as u32,
            sector_high: (sector >> 32) as u32,
            dirty: false,
        }
    }

    #[inline]
    pub fn sector(&self) -> u64 {
        (self.sector_high as u64) << 32 | self.sector_low as u64
    }

    /// The match predicate used by the disk path.
    #[inline]
    pub fn matches(&self, sector: u64) -> bool {
        self.sector_low == sector as u32 && self.sector_high == (sector >> 32) as u32
    }
}

struct CacheSlot {
    buffer: Box<SectorBuffer>,
    inserted_at_ms: u64,
    ttl_ms: u64,
}

impl CacheSlot {
    fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.inserted_at_ms) >= self.ttl_ms
    }
}

/// Fixed-capacity sector cache with TTL-based expiry.
pub struct SectorCache {
    slots: Vec<CacheSlot>,
    capacity: usize,
}

impl SectorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Linear scan for the first entry the predicate accepts.
    pub fn find(&mut self, predicate: impl Fn(&SectorBuffer) -> bool) -> Option<&mut SectorBuffer> {
        self.slots
            .iter_mut()
            .map(|slot| slot.buffer.as_mut())
            .find(|buffer| predicate(buffer))
    }

    /// Insert a buffer. Expired entries are swept first; if the cache is
    /// still full, the oldest entry (smallest insert time) is evicted to
    /// make room.
    pub fn add(
        &mut self,
        buffer: Box<SectorBuffer>,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Result<(), DriverError> {
        self.cleanup(now_ms);
        if self.slots.len() >= self.capacity {
            let Some(oldest) = self
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, slot)| slot.inserted_at_ms)
                .map(|(index, _)| index)
            else {
                return Err(DriverError::Unexpected);
            };
            self.slots.swap_remove(oldest);
        }
        self.slots.push(CacheSlot {
            buffer,
            inserted_at_ms: now_ms,
            ttl_ms,
        });
        Ok(())
    }

    /// Sweep entries whose TTL elapsed. Returns how many were evicted.
    pub fn cleanup(&mut self, now_ms: u64) -> usize {
        let before = self.slots.len();
        self.slots.retain(|slot| !slot.expired(now_ms));
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
