//! Buffer manager: the pinned-page access layer over pool and files.
//!
//! All page I/O is routed through the buffer pool for caching. Callers pin a
//! page with `read_page`/`alloc_page`, mutate it through the returned guard,
//! and the guard unpins on drop, staging write-back if the page was dirtied.

use crate::file::FileManager;
use burrow_buffer::{BufferPool, BufferPoolStats, FrameId, PageKey};
use burrow_common::{FileId, PageId, Result, PAGE_SIZE};
use std::sync::Arc;

/// Buffer manager coordinating the buffer pool and the file manager.
///
/// Shared behind an `Arc` so page guards can own a reference to it and stay
/// alive independently of the borrow that produced them.
pub struct BufMgr {
    /// In-memory page cache.
    pool: BufferPool,
    /// On-disk paged files.
    files: FileManager,
}

impl BufMgr {
    /// Creates a new buffer manager.
    pub fn new(pool: BufferPool, files: FileManager) -> Arc<Self> {
        Arc::new(Self { pool, files })
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns the underlying file manager.
    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// Returns buffer pool statistics.
    pub fn stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    /// Pins a page, loading it from disk on a cache miss.
    pub fn read_page(self: &Arc<Self>, file: FileId, page_no: PageId) -> Result<PageGuard> {
        let key = PageKey::new(file, page_no);

        if let Some(frame_id) = self.pool.fetch_page(key) {
            return Ok(PageGuard::new(Arc::clone(self), key, frame_id));
        }

        let data = self.files.read_page(file, page_no)?;
        let (frame_id, evicted) = self.pool.register_page(key)?;
        let guard = PageGuard::new(Arc::clone(self), key, frame_id);
        if let Some(ev) = evicted {
            self.files.write_page(ev.key.file, ev.key.page_no, &*ev.data)?;
        }
        self.pool.load_frame(frame_id, &data);

        Ok(guard)
    }

    /// Allocates a new page in the file and pins it.
    ///
    /// The returned page is zero-filled.
    pub fn alloc_page(self: &Arc<Self>, file: FileId) -> Result<(PageId, PageGuard)> {
        let page_no = self.files.allocate_page(file)?;
        let key = PageKey::new(file, page_no);

        let (frame_id, evicted) = self.pool.register_page(key)?;
        let guard = PageGuard::new(Arc::clone(self), key, frame_id);
        if let Some(ev) = evicted {
            self.files.write_page(ev.key.file, ev.key.page_no, &*ev.data)?;
        }

        Ok((page_no, guard))
    }

    /// Writes all dirty cached pages belonging to one file back to disk.
    pub fn flush_file(&self, file: FileId) -> Result<()> {
        self.pool.flush_pages(
            |key| key.file == file,
            |key, data| self.files.write_page(key.file, key.page_no, data),
        )?;
        self.files.sync(file)
    }
}

/// An owned lease on a pinned page.
///
/// Dropping the guard unpins the page; if any mutable access happened (or
/// `mark_dirty` was called) the page is staged for write-back.
pub struct PageGuard {
    mgr: Arc<BufMgr>,
    key: PageKey,
    frame_id: FrameId,
    dirty: bool,
}

impl PageGuard {
    fn new(mgr: Arc<BufMgr>, key: PageKey, frame_id: FrameId) -> Self {
        Self {
            mgr,
            key,
            frame_id,
            dirty: false,
        }
    }

    /// Returns the page number this guard pins.
    pub fn page_no(&self) -> PageId {
        self.key.page_no
    }

    /// Runs a closure over the page bytes.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        self.mgr.pool.with_frame(self.frame_id, f)
    }

    /// Runs a closure over the mutable page bytes, marking the page dirty.
    pub fn with_data_mut<R>(&mut self, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> R {
        self.dirty = true;
        self.mgr.pool.with_frame_mut(self.frame_id, f)
    }

    /// Forces the dirty bit without mutating, so the unpin stages write-back.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.mgr.pool.unpin_page(self.key, self.dirty);
    }
}
