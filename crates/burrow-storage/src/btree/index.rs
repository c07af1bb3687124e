//! Disk-backed B+-tree index over fixed-width integer keys.
//!
//! The index maps integer keys, read at a configured byte offset of each
//! record in a heap relation, to record ids. It lives in its own paged file:
//! page 1 holds the metadata, every other page is a tree node. All page
//! access goes through the buffer manager under a strict pin / mutate /
//! dirty-unpin discipline.

use crate::btree::meta::{IndexMeta, MAX_RELATION_NAME, META_PAGE_NO};
use crate::btree::node::{self, InternalNode, LeafNode};
use crate::btree::scan::{Operator, ScanState};
use crate::bufmgr::BufMgr;
use crate::heap::HeapFile;
use burrow_common::{BurrowError, FileId, KeyType, PageId, RecordId, Result};
use std::sync::Arc;

/// Smallest occupancy an index may be configured with. Splits assume a node
/// holds at least this many entries.
const MIN_OCCUPANCY: usize = 4;

/// Tuning knobs for index creation.
///
/// Occupancies default to the maximum the page size allows; overrides must
/// stay within `[MIN_OCCUPANCY, derived maximum]`. The values chosen at
/// creation are persisted in the header page and adopted on reopen.
#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Maximum entries per leaf.
    pub leaf_occupancy: Option<usize>,
    /// Maximum keys per internal node.
    pub node_occupancy: Option<usize>,
}

/// Outcome of a recursive insert, propagated to the parent.
enum InsertResult {
    /// The subtree absorbed the insertion.
    Done,
    /// The subtree split; the parent must insert `(key, right)` immediately
    /// to the right of the child it descended into.
    Split { key: i32, right: PageId },
}

/// A B+-tree index over one attribute of a heap relation.
///
/// Single-writer: mutation takes `&mut self`, and the index assumes it has
/// exclusive ownership of its file for the duration of each operation.
pub struct BTreeIndex {
    /// Buffer manager for page access.
    bufmgr: Arc<BufMgr>,
    /// The index file.
    file: FileId,
    /// Index file name, `"{relation}.{offset}"`.
    index_name: String,
    /// Name of the indexed relation.
    relation_name: String,
    /// Byte offset of the indexed attribute within each record.
    attr_byte_offset: usize,
    /// Datatype of the indexed attribute.
    key_type: KeyType,
    /// Current root page.
    root_page_no: PageId,
    /// Tree height; 0 means the root is a leaf.
    height: u32,
    /// Maximum entries per leaf.
    leaf_occupancy: usize,
    /// Maximum keys per internal node.
    node_occupancy: usize,
    /// Live range scan, if any.
    scan: Option<ScanState>,
    /// Set once `close` has run.
    closed: bool,
}

impl BTreeIndex {
    /// Opens the index for `relation` keyed on the attribute at
    /// `attr_byte_offset`, creating and bulk-building it on first open.
    ///
    /// Returns the index and its file name. On an existing file the stored
    /// metadata must match the arguments; on a fresh file every record of
    /// the relation is inserted in storage order.
    pub fn open(
        bufmgr: Arc<BufMgr>,
        relation: &HeapFile,
        attr_byte_offset: usize,
        key_type: KeyType,
        config: IndexConfig,
    ) -> Result<(Self, String)> {
        let relation_name = relation.name().to_string();
        if relation_name.len() > MAX_RELATION_NAME {
            return Err(BurrowError::InvalidParameter {
                name: "relation_name".to_string(),
                value: relation_name,
            });
        }
        let index_name = format!("{}.{}", relation_name, attr_byte_offset);

        let leaf_cap = node::max_leaf_occupancy();
        let node_cap = node::max_node_occupancy();
        let leaf_occupancy = config.leaf_occupancy.unwrap_or(leaf_cap);
        if !(MIN_OCCUPANCY..=leaf_cap).contains(&leaf_occupancy) {
            return Err(BurrowError::InvalidParameter {
                name: "leaf_occupancy".to_string(),
                value: leaf_occupancy.to_string(),
            });
        }
        let node_occupancy = config.node_occupancy.unwrap_or(node_cap);
        if !(MIN_OCCUPANCY..=node_cap).contains(&node_occupancy) {
            return Err(BurrowError::InvalidParameter {
                name: "node_occupancy".to_string(),
                value: node_occupancy.to_string(),
            });
        }

        let existed = bufmgr.files().exists(&index_name);
        let file = bufmgr.files().open(&index_name)?;

        if existed {
            let mut guard = bufmgr.read_page(file, META_PAGE_NO)?;
            let meta = guard.with_data(|data| IndexMeta::read_from(data))?;
            guard.mark_dirty();
            drop(guard);

            if meta.relation_name != relation_name {
                return Err(BurrowError::MetadataMismatch {
                    field: "relation_name",
                });
            }
            if meta.attr_byte_offset as usize != attr_byte_offset {
                return Err(BurrowError::MetadataMismatch {
                    field: "attr_byte_offset",
                });
            }
            if meta.key_type != key_type {
                return Err(BurrowError::MetadataMismatch { field: "key_type" });
            }
            if let Some(occ) = config.leaf_occupancy {
                if occ != meta.leaf_occupancy as usize {
                    return Err(BurrowError::MetadataMismatch {
                        field: "leaf_occupancy",
                    });
                }
            }
            if let Some(occ) = config.node_occupancy {
                if occ != meta.node_occupancy as usize {
                    return Err(BurrowError::MetadataMismatch {
                        field: "node_occupancy",
                    });
                }
            }

            let index = Self {
                bufmgr,
                file,
                index_name: index_name.clone(),
                relation_name,
                attr_byte_offset,
                key_type,
                root_page_no: meta.root_page_no,
                height: meta.height,
                leaf_occupancy: meta.leaf_occupancy as usize,
                node_occupancy: meta.node_occupancy as usize,
                scan: None,
                closed: false,
            };
            return Ok((index, index_name));
        }

        // Fresh index: header page, then an empty leaf as root
        let (meta_page_no, mut meta_guard) = bufmgr.alloc_page(file)?;
        if meta_page_no != META_PAGE_NO {
            return Err(BurrowError::Corrupted(format!(
                "index header landed on {} instead of {}",
                meta_page_no, META_PAGE_NO
            )));
        }

        let (root_page_no, mut root_guard) = bufmgr.alloc_page(file)?;
        root_guard.with_data_mut(|data| LeafNode::new().write_to(data));
        drop(root_guard);

        let meta = IndexMeta {
            relation_name: relation_name.clone(),
            attr_byte_offset: attr_byte_offset as u32,
            key_type,
            root_page_no,
            height: 0,
            leaf_occupancy: leaf_occupancy as u16,
            node_occupancy: node_occupancy as u16,
        };
        meta_guard.with_data_mut(|data| meta.write_to(data));
        drop(meta_guard);

        let mut index = Self {
            bufmgr,
            file,
            index_name: index_name.clone(),
            relation_name,
            attr_byte_offset,
            key_type,
            root_page_no,
            height: 0,
            leaf_occupancy,
            node_occupancy,
            scan: None,
            closed: false,
        };

        // Bulk build: drive the relation scan end to end
        let width = key_type.width();
        for item in relation.scan()? {
            let (rid, record) = item?;
            if record.len() < attr_byte_offset + width {
                return Err(BurrowError::RecordTooShort {
                    got: record.len(),
                    need: width,
                    offset: attr_byte_offset,
                });
            }
            index.insert_entry(&record[attr_byte_offset..attr_byte_offset + width], rid)?;
        }

        Ok((index, index_name))
    }

    /// Returns the index file name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the tree height (0 = root is a leaf).
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the current root page.
    pub fn root_page_no(&self) -> PageId {
        self.root_page_no
    }

    /// Returns the maximum entries per leaf.
    pub fn leaf_occupancy(&self) -> usize {
        self.leaf_occupancy
    }

    /// Returns the maximum keys per internal node.
    pub fn node_occupancy(&self) -> usize {
        self.node_occupancy
    }

    /// Returns true if a range scan is in progress.
    pub fn scan_active(&self) -> bool {
        self.scan.is_some()
    }

    /// Returns the active scan's normalized closed bounds, if any.
    pub fn scan_range(&self) -> Option<(i32, i32)> {
        self.scan.as_ref().map(|s| (s.low, s.high))
    }

    /// Decodes a key from its on-record byte form.
    fn extract_key(&self, bytes: &[u8]) -> Result<i32> {
        match self.key_type {
            KeyType::Integer => {
                if bytes.len() < 4 {
                    return Err(BurrowError::RecordTooShort {
                        got: bytes.len(),
                        need: 4,
                        offset: 0,
                    });
                }
                Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
        }
    }

    /// Inserts a key/record-id pair.
    ///
    /// `key` is the raw attribute bytes as they appear in the record.
    /// Re-inserting an existing key overwrites its record id in place.
    pub fn insert_entry(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        let key = self.extract_key(key)?;
        match self.insert(0, self.root_page_no, key, rid)? {
            InsertResult::Done => Ok(()),
            InsertResult::Split { key, right } => self.grow_root(key, right),
        }
    }

    /// Recursive insert. `depth` counts from the root; the node at
    /// `depth == height` is a leaf, everything above is internal.
    fn insert(&mut self, depth: u32, page_no: PageId, key: i32, rid: RecordId) -> Result<InsertResult> {
        let mut guard = self.bufmgr.read_page(self.file, page_no)?;

        let result = if depth == self.height {
            let mut leaf = guard.with_data(|data| LeafNode::read_from(data));

            let idx = leaf.lower_bound(key);
            if idx < leaf.len() && leaf.keys[idx] == key {
                // Point update: same key collapses onto the existing slot
                leaf.rids[idx] = rid;
                guard.with_data_mut(|data| leaf.write_to(data));
                InsertResult::Done
            } else if leaf.len() < self.leaf_occupancy {
                leaf.insert_sorted(key, rid);
                guard.with_data_mut(|data| leaf.write_to(data));
                InsertResult::Done
            } else {
                let split = self.split_leaf(&mut leaf, key, rid)?;
                guard.with_data_mut(|data| leaf.write_to(data));
                split
            }
        } else {
            let mut inner = guard.with_data(|data| InternalNode::read_from(data));
            let idx = inner.lower_bound(key);
            let child = inner.children[idx];

            match self.insert(depth + 1, child, key, rid)? {
                InsertResult::Done => InsertResult::Done,
                InsertResult::Split { key: up_key, right } => {
                    if inner.len() < self.node_occupancy {
                        inner.insert_sorted(up_key, right);
                        guard.with_data_mut(|data| inner.write_to(data));
                        InsertResult::Done
                    } else {
                        let split = self.split_internal(&mut inner, up_key, right)?;
                        guard.with_data_mut(|data| inner.write_to(data));
                        split
                    }
                }
            }
        };

        // Every page on the descent path is released dirty
        guard.mark_dirty();
        Ok(result)
    }

    /// Splits a full leaf around a new entry.
    ///
    /// The caller writes `left` back; the new right sibling is written and
    /// released here. The separator is copied up: it stays in the left leaf
    /// and also routes the parent.
    fn split_leaf(&mut self, left: &mut LeafNode, key: i32, rid: RecordId) -> Result<InsertResult> {
        let (right_page_no, mut right_guard) = self.bufmgr.alloc_page(self.file)?;
        let mut right = LeafNode::new();

        // Bias the split point so the new entry lands on the less-full side
        let mut mid = (left.len() + 1) / 2;
        if mid > 0 && key < left.keys[mid - 1] {
            mid -= 1;
        }

        let moved_keys = left.keys.split_off(mid);
        let moved_rids = left.rids.split_off(mid);
        for (k, r) in moved_keys.into_iter().zip(moved_rids) {
            right.insert_sorted(k, r);
        }

        if left.keys.last().map_or(true, |&last| key <= last) {
            left.insert_sorted(key, rid);
        } else {
            right.insert_sorted(key, rid);
        }

        // Thread the new leaf into the sibling chain
        right.right_sib = left.right_sib;
        left.right_sib = right_page_no;

        let split_key = match left.keys.last() {
            Some(&k) => k,
            None => {
                return Err(BurrowError::Corrupted(
                    "leaf split left an empty node".to_string(),
                ))
            }
        };

        right_guard.with_data_mut(|data| right.write_to(data));
        drop(right_guard);

        Ok(InsertResult::Split {
            key: split_key,
            right: right_page_no,
        })
    }

    /// Splits a full internal node around a new separator.
    ///
    /// The caller writes `left` back; the new right sibling is written and
    /// released here. The separator is pushed up: it leaves the left node,
    /// whose orphaned rightmost child becomes the right node's leftmost.
    fn split_internal(
        &mut self,
        left: &mut InternalNode,
        key: i32,
        child: PageId,
    ) -> Result<InsertResult> {
        let (right_page_no, mut right_guard) = self.bufmgr.alloc_page(self.file)?;
        let mut right = InternalNode::new(left.level);

        let mut mid = (left.len() + 1) / 2;
        if mid > 0 && key < left.keys[mid - 1] {
            mid -= 1;
        }

        // Each moved separator takes its right-hand child along; the left
        // node stays consistent with one more child than keys
        let moved_keys = left.keys.split_off(mid);
        let moved_children: Vec<PageId> = left.children.drain(mid + 1..).collect();
        for (k, c) in moved_keys.into_iter().zip(moved_children) {
            right.insert_sorted(k, c);
        }

        if left.keys.last().map_or(true, |&last| key <= last) {
            left.insert_sorted(key, child);
        } else {
            right.insert_sorted(key, child);
        }

        // Push-up: the left node's trailing child moves across, and the
        // separator key leaves the left node entirely
        let trailing = match left.children.pop() {
            Some(c) => c,
            None => {
                return Err(BurrowError::Corrupted(
                    "internal split left a node without children".to_string(),
                ))
            }
        };
        right.children[0] = trailing;
        let split_key = match left.keys.pop() {
            Some(k) => k,
            None => {
                return Err(BurrowError::Corrupted(
                    "internal split left an empty node".to_string(),
                ))
            }
        };

        right_guard.with_data_mut(|data| right.write_to(data));
        drop(right_guard);

        Ok(InsertResult::Split {
            key: split_key,
            right: right_page_no,
        })
    }

    /// Installs a new root above the split halves and bumps the height.
    fn grow_root(&mut self, split_key: i32, right: PageId) -> Result<()> {
        let (new_root_no, mut guard) = self.bufmgr.alloc_page(self.file)?;

        let mut root = InternalNode::new(self.height as u16);
        root.children[0] = self.root_page_no;
        root.insert_sorted(split_key, right);
        guard.with_data_mut(|data| root.write_to(data));
        drop(guard);

        self.root_page_no = new_root_no;
        self.height += 1;
        self.write_meta()
    }

    /// Rewrites the header page from the in-memory state.
    fn write_meta(&self) -> Result<()> {
        let meta = IndexMeta {
            relation_name: self.relation_name.clone(),
            attr_byte_offset: self.attr_byte_offset as u32,
            key_type: self.key_type,
            root_page_no: self.root_page_no,
            height: self.height,
            leaf_occupancy: self.leaf_occupancy as u16,
            node_occupancy: self.node_occupancy as u16,
        };

        let mut guard = self.bufmgr.read_page(self.file, META_PAGE_NO)?;
        guard.with_data_mut(|data| meta.write_to(data));
        Ok(())
    }

    /// Walks from the root to the leaf whose key range contains `key`,
    /// releasing every internal page clean. Returns the leaf unpinned.
    fn descend_to_leaf(&self, key: i32) -> Result<PageId> {
        let mut current = self.root_page_no;
        for _ in 0..self.height {
            let guard = self.bufmgr.read_page(self.file, current)?;
            let inner = guard.with_data(|data| InternalNode::read_from(data));
            current = inner.children[inner.lower_bound(key)];
        }
        Ok(current)
    }

    /// Begins a range scan over `[low, high]` as filtered by the operators.
    ///
    /// The low operator must be `Gt` or `Gte`, the high operator `Lt` or
    /// `Lte`. Fails with `NoSuchKey` if the leaf covering the lower bound
    /// holds no key at or above it. Any scan already in progress is ended
    /// first.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }

        if !matches!(low_op, Operator::Gt | Operator::Gte)
            || !matches!(high_op, Operator::Lt | Operator::Lte)
        {
            return Err(BurrowError::BadOpcodes);
        }
        if low > high {
            return Err(BurrowError::BadScanRange);
        }

        // Normalize to closed bounds; a bound that falls off the integer
        // range cannot match anything
        let low_val = match low_op {
            Operator::Gt => low.checked_add(1).ok_or(BurrowError::NoSuchKey)?,
            _ => low,
        };
        let high_val = match high_op {
            Operator::Lt => high.checked_sub(1).ok_or(BurrowError::NoSuchKey)?,
            _ => high,
        };

        let leaf_page = self.descend_to_leaf(low_val)?;
        let guard = self.bufmgr.read_page(self.file, leaf_page)?;
        let leaf = guard.with_data(|data| LeafNode::read_from(data));

        let next_entry = leaf.lower_bound(low_val);
        if next_entry == leaf.len() {
            // Nothing at or above the bound in this leaf
            return Err(BurrowError::NoSuchKey);
        }

        self.scan = Some(ScanState {
            low: low_val,
            high: high_val,
            page: Some(guard),
            leaf,
            next_entry,
        });
        Ok(())
    }

    /// Yields the record id of the next entry in the scan range.
    ///
    /// Fails with `ScanComplete` once the range is exhausted and with
    /// `ScanNotInitialized` if no scan is active.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let state = self.scan.as_mut().ok_or(BurrowError::ScanNotInitialized)?;

        if state.page.is_none() {
            return Err(BurrowError::ScanComplete);
        }

        let key = match state.leaf.keys.get(state.next_entry) {
            Some(&k) => k,
            None => {
                if let Some(mut guard) = state.page.take() {
                    guard.mark_dirty();
                }
                return Err(BurrowError::ScanComplete);
            }
        };

        if key > state.high {
            if let Some(mut guard) = state.page.take() {
                guard.mark_dirty();
            }
            return Err(BurrowError::ScanComplete);
        }

        let rid = state.leaf.rids[state.next_entry];
        state.next_entry += 1;

        if state.next_entry >= state.leaf.len() {
            // Leaf exhausted: release it and hop to the right sibling
            let sibling = state.leaf.right_sib;
            if let Some(mut guard) = state.page.take() {
                guard.mark_dirty();
            }
            if sibling.is_valid() {
                let guard = self.bufmgr.read_page(self.file, sibling)?;
                let state = match self.scan.as_mut() {
                    Some(s) => s,
                    None => return Err(BurrowError::ScanNotInitialized),
                };
                state.leaf = guard.with_data(|data| LeafNode::read_from(data));
                state.next_entry = 0;
                state.page = Some(guard);
            }
            // Otherwise the next call reports completion
        }

        Ok(rid)
    }

    /// Ends the scan, releasing the held leaf pin.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self.scan.take().ok_or(BurrowError::ScanNotInitialized)?;
        if let Some(mut guard) = state.page {
            guard.mark_dirty();
        }
        Ok(())
    }

    /// Writes the index's dirty pages back to disk.
    pub fn flush(&self) -> Result<()> {
        self.bufmgr.flush_file(self.file)
    }

    /// Closes the index: ends any live scan, flushes the file, and releases
    /// the file handle.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.scan.is_some() {
            self.end_scan()?;
        }
        self.bufmgr.flush_file(self.file)?;
        self.bufmgr.files().close(self.file)?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if !self.closed {
            self.scan = None;
            let _ = self.bufmgr.flush_file(self.file);
            let _ = self.bufmgr.files().close(self.file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileManager, FileManagerConfig};
    use burrow_buffer::{BufferPool, BufferPoolConfig};
    use tempfile::tempdir;

    struct Fixture {
        bufmgr: Arc<BufMgr>,
        heap: HeapFile,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let files = FileManager::new(FileManagerConfig {
            data_dir: dir.path().to_path_buf(),
            fsync_enabled: false,
        })
        .unwrap();
        let pool = BufferPool::new(BufferPoolConfig { num_frames: 256 });
        let bufmgr = BufMgr::new(pool, files);
        let heap = HeapFile::open(Arc::clone(&bufmgr), "rel").unwrap();
        Fixture {
            bufmgr,
            heap,
            _dir: dir,
        }
    }

    fn tiny_config() -> IndexConfig {
        IndexConfig {
            leaf_occupancy: Some(4),
            node_occupancy: Some(4),
        }
    }

    fn open_empty(fx: &Fixture, config: IndexConfig) -> BTreeIndex {
        let (index, _) =
            BTreeIndex::open(Arc::clone(&fx.bufmgr), &fx.heap, 0, KeyType::Integer, config)
                .unwrap();
        index
    }

    fn rid(n: u32) -> RecordId {
        RecordId::new(PageId(n + 1), (n % 7) as u16)
    }

    fn insert_key(index: &mut BTreeIndex, key: i32, r: RecordId) {
        index.insert_entry(&key.to_le_bytes(), r).unwrap();
    }

    fn collect_scan(index: &mut BTreeIndex) -> Vec<RecordId> {
        let mut rids = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => rids.push(rid),
                Err(BurrowError::ScanComplete) => break,
                Err(e) => panic!("unexpected scan error: {e}"),
            }
        }
        rids
    }

    #[test]
    fn test_open_names_index_after_relation_and_offset() {
        let fx = fixture();
        let (index, name) = BTreeIndex::open(
            Arc::clone(&fx.bufmgr),
            &fx.heap,
            12,
            KeyType::Integer,
            IndexConfig::default(),
        )
        .unwrap();

        assert_eq!(name, "rel.12");
        assert_eq!(index.index_name(), "rel.12");
        assert_eq!(index.height(), 0);
    }

    #[test]
    fn test_default_occupancies_derived_from_page_size() {
        let fx = fixture();
        let index = open_empty(&fx, IndexConfig::default());
        assert_eq!(index.leaf_occupancy(), node::max_leaf_occupancy());
        assert_eq!(index.node_occupancy(), node::max_node_occupancy());
    }

    #[test]
    fn test_occupancy_override_out_of_range() {
        let fx = fixture();
        let result = BTreeIndex::open(
            Arc::clone(&fx.bufmgr),
            &fx.heap,
            0,
            KeyType::Integer,
            IndexConfig {
                leaf_occupancy: Some(1),
                node_occupancy: None,
            },
        );
        assert!(matches!(
            result,
            Err(BurrowError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_single_leaf_insert_and_scan() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        for &k in &[5, 2, 8, 1] {
            insert_key(&mut index, k, rid(k as u32));
        }

        assert_eq!(index.height(), 0);

        index.start_scan(0, Operator::Gte, 100, Operator::Lte).unwrap();
        let rids = collect_scan(&mut index);
        assert_eq!(rids, vec![rid(1), rid(2), rid(5), rid(8)]);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_leaf_split_grows_root() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        for k in 1..=6 {
            insert_key(&mut index, k, rid(k as u32));
        }

        assert_eq!(index.height(), 1);

        // Root is internal with a single separator; the left leaf keeps the
        // separator key (copy-up) and the leaves are chained left to right
        let root_guard = fx
            .bufmgr
            .read_page(fx.bufmgr.files().open("rel.0").unwrap(), index.root_page_no())
            .unwrap();
        let root = root_guard.with_data(|d| InternalNode::read_from(d));
        drop(root_guard);

        assert_eq!(root.len(), 1);
        assert_eq!(root.keys[0], 2);

        let file = fx.bufmgr.files().open("rel.0").unwrap();
        let left_guard = fx.bufmgr.read_page(file, root.children[0]).unwrap();
        let left = left_guard.with_data(|d| LeafNode::read_from(d));
        drop(left_guard);
        let right_guard = fx.bufmgr.read_page(file, root.children[1]).unwrap();
        let right = right_guard.with_data(|d| LeafNode::read_from(d));
        drop(right_guard);

        assert_eq!(left.keys, vec![1, 2]);
        assert_eq!(right.keys, vec![3, 4, 5, 6]);
        assert_eq!(left.right_sib, root.children[1]);
        assert!(!right.right_sib.is_valid());

        // The full range scans back in order
        index.start_scan(1, Operator::Gte, 6, Operator::Lte).unwrap();
        let rids = collect_scan(&mut index);
        assert_eq!(rids.len(), 6);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_many_inserts_keep_order() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        // Descending order forces splits on the left edge
        for k in (0..100).rev() {
            insert_key(&mut index, k, rid(k as u32));
        }
        assert!(index.height() >= 2);

        index.start_scan(0, Operator::Gte, 99, Operator::Lte).unwrap();
        let rids = collect_scan(&mut index);
        assert_eq!(rids.len(), 100);
        for (i, r) in rids.iter().enumerate() {
            assert_eq!(*r, rid(i as u32));
        }
        index.end_scan().unwrap();
    }

    #[test]
    fn test_duplicate_key_overwrites() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        insert_key(&mut index, 42, rid(1));
        insert_key(&mut index, 42, rid(2));

        index.start_scan(42, Operator::Gte, 42, Operator::Lte).unwrap();
        let rids = collect_scan(&mut index);
        assert_eq!(rids, vec![rid(2)]);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_bound_normalization() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        for k in 1..=20 {
            insert_key(&mut index, k, rid(k as u32));
        }

        // (GT 5, LT 10) matches 6..=9
        index.start_scan(5, Operator::Gt, 10, Operator::Lt).unwrap();
        assert_eq!(index.scan_range(), Some((6, 9)));
        let rids = collect_scan(&mut index);
        assert_eq!(rids, (6..=9).map(|k| rid(k as u32)).collect::<Vec<_>>());
        index.end_scan().unwrap();

        // (GTE 5, LTE 10) matches 5..=10
        index.start_scan(5, Operator::Gte, 10, Operator::Lte).unwrap();
        let rids = collect_scan(&mut index);
        assert_eq!(rids.len(), 6);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_rejects_bad_operators() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        insert_key(&mut index, 1, rid(1));

        let result = index.start_scan(10, Operator::Gt, 20, Operator::Gt);
        assert!(matches!(result, Err(BurrowError::BadOpcodes)));

        let result = index.start_scan(10, Operator::Lt, 20, Operator::Lte);
        assert!(matches!(result, Err(BurrowError::BadOpcodes)));

        // The failed start leaves no scan behind
        assert!(matches!(
            index.scan_next(),
            Err(BurrowError::ScanNotInitialized)
        ));
    }

    #[test]
    fn test_scan_rejects_inverted_range() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        insert_key(&mut index, 1, rid(1));

        let result = index.start_scan(20, Operator::Gte, 10, Operator::Lte);
        assert!(matches!(result, Err(BurrowError::BadScanRange)));
    }

    #[test]
    fn test_scan_no_such_key() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        insert_key(&mut index, 1, rid(1));

        let result = index.start_scan(50, Operator::Gte, 60, Operator::Lte);
        assert!(matches!(result, Err(BurrowError::NoSuchKey)));
        assert!(!index.scan_active());
        assert_eq!(fx.bufmgr.stats().pinned_frames, 0);
    }

    #[test]
    fn test_scan_lifecycle_errors() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        insert_key(&mut index, 1, rid(1));

        assert!(matches!(
            index.scan_next(),
            Err(BurrowError::ScanNotInitialized)
        ));
        assert!(matches!(
            index.end_scan(),
            Err(BurrowError::ScanNotInitialized)
        ));

        index.start_scan(0, Operator::Gte, 10, Operator::Lte).unwrap();
        assert!(index.scan_active());
        collect_scan(&mut index);
        // Completion is sticky
        assert!(matches!(index.scan_next(), Err(BurrowError::ScanComplete)));
        index.end_scan().unwrap();
        assert!(!index.scan_active());
    }

    #[test]
    fn test_exactly_one_pin_during_scan() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        for k in 0..50 {
            insert_key(&mut index, k, rid(k as u32));
        }
        assert_eq!(fx.bufmgr.stats().pinned_frames, 0);

        index.start_scan(0, Operator::Gte, 49, Operator::Lte).unwrap();
        assert_eq!(fx.bufmgr.stats().total_pins, 1);

        for _ in 0..20 {
            index.scan_next().unwrap();
        }
        assert_eq!(fx.bufmgr.stats().total_pins, 1);

        index.end_scan().unwrap();
        assert_eq!(fx.bufmgr.stats().total_pins, 0);
    }

    #[test]
    fn test_pin_balance_after_inserts() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        for k in 0..200 {
            insert_key(&mut index, k, rid(k as u32));
            assert_eq!(fx.bufmgr.stats().total_pins, 0);
        }
    }

    #[test]
    fn test_starting_new_scan_ends_previous() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        for k in 0..10 {
            insert_key(&mut index, k, rid(k as u32));
        }

        index.start_scan(0, Operator::Gte, 9, Operator::Lte).unwrap();
        index.scan_next().unwrap();

        index.start_scan(5, Operator::Gte, 9, Operator::Lte).unwrap();
        assert_eq!(index.scan_next().unwrap(), rid(5));
        assert_eq!(fx.bufmgr.stats().total_pins, 1);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_short_key_rejected() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        let result = index.insert_entry(&[1, 2], rid(0));
        assert!(matches!(result, Err(BurrowError::RecordTooShort { .. })));
    }

    #[test]
    fn test_negative_keys() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());

        for &k in &[-10, 5, -3, 0, 7, -20] {
            insert_key(&mut index, k, rid(k.unsigned_abs()));
        }

        index
            .start_scan(i32::MIN, Operator::Gte, i32::MAX, Operator::Lte)
            .unwrap();
        let rids = collect_scan(&mut index);
        assert_eq!(
            rids,
            [-20, -10, -3, 0, 5, 7]
                .iter()
                .map(|&k: &i32| rid(k.unsigned_abs()))
                .collect::<Vec<_>>()
        );
        index.end_scan().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        insert_key(&mut index, 1, rid(1));

        index.close().unwrap();
        index.close().unwrap();
    }

    #[test]
    fn test_close_ends_live_scan() {
        let fx = fixture();
        let mut index = open_empty(&fx, tiny_config());
        for k in 0..10 {
            insert_key(&mut index, k, rid(k as u32));
        }

        index.start_scan(0, Operator::Gte, 9, Operator::Lte).unwrap();
        index.close().unwrap();
        assert_eq!(fx.bufmgr.stats().total_pins, 0);
    }
}
