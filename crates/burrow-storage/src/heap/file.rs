//! Heap relation: an append-oriented record store over the buffer manager.

use crate::bufmgr::BufMgr;
use crate::heap::page::HeapPage;
use burrow_common::{BurrowError, FileId, PageId, RecordId, Result, PAGE_SIZE};
use bytes::Bytes;
use std::sync::Arc;

/// A heap relation holding variable-length records.
///
/// Records are appended into slotted pages; a record, once inserted, keeps its
/// `RecordId` for the lifetime of the relation. All page access goes through
/// the buffer manager.
pub struct HeapFile {
    /// Buffer manager for page access.
    bufmgr: Arc<BufMgr>,
    /// File holding the relation's pages.
    file: FileId,
    /// Relation name (doubles as the file name).
    name: String,
}

impl HeapFile {
    /// Opens a heap relation by name, creating its file if absent.
    pub fn open(bufmgr: Arc<BufMgr>, name: &str) -> Result<Self> {
        let file = bufmgr.files().open(name)?;
        Ok(Self {
            bufmgr,
            file,
            name: name.to_string(),
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file id backing the relation.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns the number of data pages in the relation.
    pub fn num_pages(&self) -> Result<u32> {
        // Page 0 is reserved, data pages start at 1
        Ok(self.bufmgr.files().num_pages(self.file)?.saturating_sub(1))
    }

    /// Appends a record, returning its locator.
    pub fn insert(&self, record: &[u8]) -> Result<RecordId> {
        if record.is_empty() || record.len() > HeapPage::MAX_RECORD_SIZE {
            return Err(BurrowError::RecordTooLarge {
                size: record.len(),
                max: HeapPage::MAX_RECORD_SIZE,
            });
        }

        // Try the last data page first
        let total = self.bufmgr.files().num_pages(self.file)?;
        if total > 1 {
            let last = PageId(total - 1);
            let mut guard = self.bufmgr.read_page(self.file, last)?;
            if let Some(slot) = guard.with_data_mut(|data| HeapPage::insert_record(data, record)) {
                return Ok(RecordId::new(last, slot));
            }
        }

        // Last page full (or relation empty): start a fresh page
        let (page_no, mut guard) = self.bufmgr.alloc_page(self.file)?;
        let slot = guard.with_data_mut(|data| {
            HeapPage::init(data);
            HeapPage::insert_record(data, record)
        });
        match slot {
            Some(slot) => Ok(RecordId::new(page_no, slot)),
            // Size was checked above; a fresh page always fits
            None => Err(BurrowError::Corrupted(format!(
                "record of {} bytes rejected by empty page",
                record.len()
            ))),
        }
    }

    /// Retrieves a record by its locator.
    pub fn get(&self, rid: RecordId) -> Result<Option<Bytes>> {
        if !rid.is_valid() || rid.page_no.0 >= self.bufmgr.files().num_pages(self.file)? {
            return Ok(None);
        }

        let guard = self.bufmgr.read_page(self.file, rid.page_no)?;
        Ok(guard.with_data(|data| {
            HeapPage::get_record(data, rid.slot).map(Bytes::copy_from_slice)
        }))
    }

    /// Returns an iterator over every record in the relation, in storage
    /// order. Exhaustion is signaled by `None`.
    pub fn scan(&self) -> Result<HeapScan<'_>> {
        let total = self.bufmgr.files().num_pages(self.file)?;
        Ok(HeapScan {
            heap: self,
            next_page: 1,
            total_pages: total,
            page: None,
            next_slot: 0,
        })
    }

    /// Writes the relation's dirty pages back to disk.
    pub fn flush(&self) -> Result<()> {
        self.bufmgr.flush_file(self.file)
    }
}

/// Forward scan over a heap relation, yielding `(RecordId, Bytes)` pairs.
///
/// Each page is copied out of the pool once, so no pin is held between
/// `next` calls.
pub struct HeapScan<'a> {
    heap: &'a HeapFile,
    /// Next page to load.
    next_page: u32,
    /// Page count snapshot taken when the scan started.
    total_pages: u32,
    /// Currently loaded page, if any.
    page: Option<(PageId, Box<[u8; PAGE_SIZE]>)>,
    /// Next slot to visit on the current page.
    next_slot: u16,
}

impl HeapScan<'_> {
    fn load_next_page(&mut self) -> Result<bool> {
        if self.next_page >= self.total_pages {
            self.page = None;
            return Ok(false);
        }

        let page_no = PageId(self.next_page);
        self.next_page += 1;

        let guard = self.heap.bufmgr.read_page(self.heap.file, page_no)?;
        let data = guard.with_data(|data| {
            let mut copy = Box::new([0u8; PAGE_SIZE]);
            copy.copy_from_slice(data);
            copy
        });

        self.page = Some((page_no, data));
        self.next_slot = 0;
        Ok(true)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = Result<(RecordId, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page.is_none() {
                match self.load_next_page() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }

            if let Some((page_no, data)) = &self.page {
                let slot_count = HeapPage::slot_count(&**data);
                while self.next_slot < slot_count {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    if let Some(record) = HeapPage::get_record(&**data, slot) {
                        let rid = RecordId::new(*page_no, slot);
                        return Some(Ok((rid, Bytes::copy_from_slice(record))));
                    }
                }
            }

            // Page exhausted, advance
            self.page = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileManager, FileManagerConfig};
    use burrow_buffer::{BufferPool, BufferPoolConfig};
    use tempfile::tempdir;

    fn create_test_heap() -> (HeapFile, Arc<BufMgr>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let files = FileManager::new(FileManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        })
        .unwrap();
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 64 });
        let bufmgr = BufMgr::new(pool, files);
        let heap = HeapFile::open(Arc::clone(&bufmgr), "relation").unwrap();
        (heap, bufmgr, dir)
    }

    #[test]
    fn test_heap_open() {
        let (heap, _mgr, _dir) = create_test_heap();
        assert_eq!(heap.name(), "relation");
        assert_eq!(heap.num_pages().unwrap(), 0);
    }

    #[test]
    fn test_insert_and_get() {
        let (heap, _mgr, _dir) = create_test_heap();

        let rid = heap.insert(b"hello world").unwrap();
        assert_eq!(rid.page_no, PageId(1));
        assert_eq!(rid.slot, 0);

        let record = heap.get(rid).unwrap().unwrap();
        assert_eq!(&record[..], b"hello world");
    }

    #[test]
    fn test_get_nonexistent() {
        let (heap, _mgr, _dir) = create_test_heap();

        heap.insert(b"data").unwrap();
        assert!(heap.get(RecordId::new(PageId(99), 0)).unwrap().is_none());
        assert!(heap.get(RecordId::new(PageId(1), 99)).unwrap().is_none());
        assert!(heap.get(RecordId::INVALID).unwrap().is_none());
    }

    #[test]
    fn test_insert_too_large() {
        let (heap, _mgr, _dir) = create_test_heap();

        let too_big = vec![0u8; HeapPage::MAX_RECORD_SIZE + 1];
        let result = heap.insert(&too_big);
        assert!(matches!(result, Err(BurrowError::RecordTooLarge { .. })));
    }

    #[test]
    fn test_insert_spills_to_new_pages() {
        let (heap, _mgr, _dir) = create_test_heap();

        // Quarter-page records: a handful per page
        let record = vec![0x5Au8; PAGE_SIZE / 4];
        for _ in 0..20 {
            heap.insert(&record).unwrap();
        }

        assert!(heap.num_pages().unwrap() > 1);
    }

    #[test]
    fn test_scan_yields_all_in_order() {
        let (heap, _mgr, _dir) = create_test_heap();

        let mut inserted = Vec::new();
        for i in 0..50u32 {
            let record = i.to_le_bytes();
            inserted.push((heap.insert(&record).unwrap(), record));
        }

        let scanned: Vec<_> = heap
            .scan()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(scanned.len(), inserted.len());
        for ((rid, record), (want_rid, want_record)) in scanned.iter().zip(&inserted) {
            assert_eq!(rid, want_rid);
            assert_eq!(&record[..], &want_record[..]);
        }
    }

    #[test]
    fn test_scan_empty_relation() {
        let (heap, _mgr, _dir) = create_test_heap();
        assert_eq!(heap.scan().unwrap().count(), 0);
    }

    #[test]
    fn test_scan_holds_no_pins_between_calls() {
        let (heap, mgr, _dir) = create_test_heap();

        for i in 0..10u32 {
            heap.insert(&i.to_le_bytes()).unwrap();
        }

        let mut scan = heap.scan().unwrap();
        scan.next().unwrap().unwrap();
        assert_eq!(mgr.stats().pinned_frames, 0);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = tempdir().unwrap();

        {
            let files = FileManager::new(FileManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap();
            let pool = BufferPool::new(BufferPoolConfig { num_frames: 64 });
            let bufmgr = BufMgr::new(pool, files);
            let heap = HeapFile::open(Arc::clone(&bufmgr), "relation").unwrap();
            for i in 0..10u32 {
                heap.insert(&i.to_le_bytes()).unwrap();
            }
            heap.flush().unwrap();
        }

        {
            let files = FileManager::new(FileManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap();
            let pool = BufferPool::new(BufferPoolConfig { num_frames: 64 });
            let bufmgr = BufMgr::new(pool, files);
            let heap = HeapFile::open(bufmgr, "relation").unwrap();

            let records: Vec<_> = heap
                .scan()
                .unwrap()
                .collect::<Result<Vec<_>>>()
                .unwrap();
            assert_eq!(records.len(), 10);
            assert_eq!(&records[3].1[..], &3u32.to_le_bytes());
        }
    }
}
