//! Lock-free page table mapping page keys to frame IDs.

use crate::frame::{FrameId, PageKey};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Sentinel value for empty key slots.
const EMPTY_KEY: u64 = u64::MAX;

/// Sentinel value for deleted key slots (tombstone).
const TOMBSTONE_KEY: u64 = u64::MAX - 1;

/// Sentinel value for empty frame slots.
const EMPTY_FRAME: u32 = u32::MAX;

/// Lock-free page table mapping PageKey to FrameId.
///
/// Open-addressing hash table with linear probing and tombstone deletion.
/// Sized to roughly 50% load factor for the configured frame count.
pub struct PageTable {
    /// Hash table keys (packed page keys).
    keys: Box<[AtomicU64]>,
    /// Hash table values (frame ids).
    values: Box<[AtomicU32]>,
    /// Bitmask for table indexing (table size - 1).
    mask: usize,
}

impl PageTable {
    /// Creates a new page table with capacity for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        // Next power of 2, 2x capacity for ~50% load factor
        let size = (capacity * 2).next_power_of_two().max(1024);

        let keys: Box<[AtomicU64]> = (0..size).map(|_| AtomicU64::new(EMPTY_KEY)).collect();
        let values: Box<[AtomicU32]> = (0..size).map(|_| AtomicU32::new(EMPTY_FRAME)).collect();

        Self {
            keys,
            values,
            mask: size - 1,
        }
    }

    /// Computes the table index for a packed key.
    #[inline(always)]
    fn index_of(&self, packed: u64) -> usize {
        // FxHash-style multiply for distribution
        let hash = packed.wrapping_mul(0x517cc1b727220a95);
        (hash as usize) & self.mask
    }

    /// Looks up a page key and returns its frame ID if present.
    #[inline]
    pub fn get(&self, key: PageKey) -> Option<FrameId> {
        let packed = key.pack();
        let mut idx = self.index_of(packed);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == packed {
                return Some(FrameId(self.values[idx].load(Ordering::Acquire)));
            }
            // Skip tombstones and continue probing
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Inserts a page key to frame ID mapping. Returns true on success.
    pub fn insert(&self, key: PageKey, frame_id: FrameId) -> bool {
        let packed = key.pack();
        let mut idx = self.index_of(packed);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY || stored == TOMBSTONE_KEY {
                self.values[idx].store(frame_id.0, Ordering::Release);
                self.keys[idx].store(packed, Ordering::Release);
                return true;
            }
            if stored == packed {
                self.values[idx].store(frame_id.0, Ordering::Release);
                return true;
            }
            idx = (idx + 1) & self.mask;
        }
        false // table full
    }

    /// Removes a page key mapping. Returns the frame ID if it was present.
    pub fn remove(&self, key: PageKey) -> Option<FrameId> {
        let packed = key.pack();
        let mut idx = self.index_of(packed);

        for _ in 0..self.keys.len() {
            let stored = self.keys[idx].load(Ordering::Acquire);
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == packed {
                let frame_id = self.values[idx].load(Ordering::Acquire);
                self.keys[idx].store(TOMBSTONE_KEY, Ordering::Release);
                return Some(FrameId(frame_id));
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Returns true if the page key is in the table.
    pub fn contains(&self, key: PageKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.keys
            .iter()
            .filter(|slot| {
                let val = slot.load(Ordering::Relaxed);
                val != EMPTY_KEY && val != TOMBSTONE_KEY
            })
            .count()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all entries, calling the provided function for each.
    /// Returns early if the function returns false.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageKey, FrameId) -> bool,
    {
        for (idx, key_slot) in self.keys.iter().enumerate() {
            let packed = key_slot.load(Ordering::Relaxed);
            if packed != EMPTY_KEY && packed != TOMBSTONE_KEY {
                let frame_id = FrameId(self.values[idx].load(Ordering::Relaxed));
                if !f(PageKey::unpack(packed), frame_id) {
                    return;
                }
            }
        }
    }
}
