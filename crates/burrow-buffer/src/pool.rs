//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId, PageKey};
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, Replacer};
use burrow_common::{BurrowError, Result, PAGE_SIZE};
use parking_lot::Mutex;
use sysinfo::System;

/// A dirty page that was evicted from the buffer pool.
/// The caller must write it back to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub key: PageKey,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page key to frame ID mapping (lock-free page table)
/// - Free frame list for new pages
/// - Clock replacement for eviction
/// - Pin counting for access tracking
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page key to frame ID mapping.
    page_table: PageTable,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in the free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames to ensure useful caching even on low-memory
    /// systems.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, key: PageKey) -> bool {
        self.page_table.contains(key)
    }

    /// Fetches a resident page, pinning it.
    ///
    /// Returns None if the page is not in the pool.
    #[inline]
    pub fn fetch_page(&self, key: PageKey) -> Option<FrameId> {
        let frame_id = self.page_table.get(key)?;
        self.frames[frame_id.0 as usize].pin();
        self.replacer.record_access(frame_id);
        Some(frame_id)
    }

    /// Allocates a frame for a new page.
    ///
    /// Tries the free list first, then evicts an unpinned frame.
    /// Returns the frame ID and any evicted dirty page that must be flushed.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        let victim_id = self
            .replacer
            .evict(&|fid| self.frames[fid.0 as usize].pin_count() == 0);

        if let Some(victim_id) = victim_id {
            let frame = &self.frames[victim_id.0 as usize];

            // Capture evicted page data if dirty
            let evicted = match (frame.is_dirty(), frame.key()) {
                (true, Some(key)) => {
                    let guard = frame.read_data();
                    let mut data = Box::new([0u8; PAGE_SIZE]);
                    data.copy_from_slice(&**guard);
                    drop(guard);
                    Some(EvictedPage { key, data })
                }
                _ => None,
            };

            if let Some(old_key) = frame.key() {
                self.page_table.remove(old_key);
            }

            return Ok((victim_id, evicted));
        }

        Err(BurrowError::BufferPoolFull)
    }

    /// Claims a frame for a page, pinning it.
    ///
    /// If the page is already resident, the existing frame is pinned and
    /// returned. Otherwise a frame is allocated (evicting if necessary) and
    /// zeroed; the caller is responsible for filling it.
    ///
    /// Returns (frame, evicted) where evicted contains any dirty page that was
    /// displaced. The caller must write evicted pages to disk.
    pub fn register_page(&self, key: PageKey) -> Result<(FrameId, Option<EvictedPage>)> {
        if let Some(frame_id) = self.page_table.get(key) {
            self.frames[frame_id.0 as usize].pin();
            self.replacer.record_access(frame_id);
            return Ok((frame_id, None));
        }

        let (frame_id, evicted) = self.allocate_frame()?;

        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_key(Some(key));
        frame.pin();

        self.page_table.insert(key, frame_id);

        Ok((frame_id, evicted))
    }

    /// Unpins a page, optionally staging it for write-back.
    ///
    /// Returns true if the page was resident.
    #[inline]
    pub fn unpin_page(&self, key: PageKey, dirty: bool) -> bool {
        if let Some(frame_id) = self.page_table.get(key) {
            let frame = &self.frames[frame_id.0 as usize];
            if dirty {
                frame.set_dirty(true);
            }
            frame.unpin();
            return true;
        }
        false
    }

    /// Runs a closure over the data of a pinned frame.
    ///
    /// The caller must hold a pin on the frame for the duration of the call;
    /// a pinned frame cannot be evicted, so the access is stable.
    #[inline]
    pub fn with_frame<R>(&self, frame_id: FrameId, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        let guard = self.frames[frame_id.0 as usize].read_data();
        f(&guard)
    }

    /// Runs a closure over the mutable data of a pinned frame.
    ///
    /// Same pin requirement as [`BufferPool::with_frame`]. Mutation does not
    /// set the dirty flag; that happens on unpin.
    #[inline]
    pub fn with_frame_mut<R>(
        &self,
        frame_id: FrameId,
        f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R,
    ) -> R {
        let mut guard = self.frames[frame_id.0 as usize].write_data();
        f(&mut guard)
    }

    /// Copies page data into a pinned frame (used when loading from disk).
    #[inline]
    pub fn load_frame(&self, frame_id: FrameId, data: &[u8]) {
        self.frames[frame_id.0 as usize].copy_from(data);
    }

    /// Flushes dirty pages selected by `want` through the `sink` callback.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_pages<W, S>(&self, want: W, mut sink: S) -> Result<usize>
    where
        W: Fn(PageKey) -> bool,
        S: FnMut(PageKey, &[u8]) -> Result<()>,
    {
        let mut targets = Vec::new();
        self.page_table.for_each(|key, frame_id| {
            if want(key) {
                targets.push((key, frame_id));
            }
            true
        });

        let mut flushed = 0;
        for (key, frame_id) in targets {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                sink(key, &**data)?;
                frame.set_dirty(false);
                flushed += 1;
            }
        }

        Ok(flushed)
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;
        let mut total_pins = 0;

        self.page_table.for_each(|_, frame_id| {
            let frame = &self.frames[frame_id.0 as usize];
            let pins = frame.pin_count();
            if pins > 0 {
                pinned_frames += 1;
                total_pins += pins as usize;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
            true
        });

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: self.page_table.len(),
            pinned_frames,
            dirty_frames,
            total_pins,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
    /// Sum of pin counts across all frames.
    pub total_pins: usize,
}
