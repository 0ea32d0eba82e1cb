use crate::buffer::{BufferPoolManager, PageId, INVALID_PAGE_ID};
use crate::config::BufferPoolConfig;
use crate::error::{ChalkDBError, ChalkDBResult};
use crate::index::key::IndexKey;
use crate::storage::codec::{IndexMetaPageCodec, InteriorPageCodec, LeafPageCodec};
use crate::storage::disk_manager::DiskManager;
use crate::storage::page::index_page::{InteriorPage, LeafPage};
use crate::storage::page::meta_page::IndexMetaPage;
use crate::storage::page::table_page::RecordId;
use crate::storage::table_heap::{TableHeap, TableIterator};
use log::debug;
use std::cmp::Ordering;
use std::path::Path;

/// The header page is the first page of every index file.
pub const HEADER_PAGE_ID: PageId = 1;

/// Comparison operators accepted by `start_scan`: the low bound takes
/// `GT`/`GTE`, the high bound takes `LT`/`LTE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOperator {
    GT,
    GTE,
    LT,
    LTE,
}

#[derive(Debug)]
struct ScanState<K: IndexKey> {
    high: K,
    high_op: ScanOperator,
    /// The one leaf held pinned for the lifetime of the scan.
    leaf_page_id: PageId,
    /// Decoded image of that leaf; valid because readers and writers never
    /// overlap and the pin blocks eviction.
    leaf: LeafPage<K>,
    cursor: usize,
}

/// Disk-backed B+ tree mapping one fixed-width attribute of a heap relation
/// to the record ids holding each value. Built by scanning the relation;
/// supports insertion and forward range scans over the sibling-linked
/// leaves. Every page access goes through the buffer pool's pin/unpin
/// protocol.
#[derive(Debug)]
pub struct BTreeIndex<K: IndexKey> {
    pub buffer_pool: BufferPoolManager,
    header_page_id: PageId,
    root_page_id: PageId,
    attr_byte_offset: usize,
    scan: Option<ScanState<K>>,
}

impl<K: IndexKey> BTreeIndex<K> {
    /// Create the index file named `"{relation_name}.{attr_byte_offset}"` in
    /// `index_dir` (overwriting any previous file), then bulk-load it by
    /// scanning the relation. Returns the index together with the derived
    /// file name.
    pub fn build(
        index_dir: impl AsRef<Path>,
        relation_name: &str,
        attr_byte_offset: usize,
        heap: &mut TableHeap,
        config: BufferPoolConfig,
    ) -> ChalkDBResult<(Self, String)> {
        let index_file_name = format!("{}.{}", relation_name, attr_byte_offset);
        let disk_manager = DiskManager::create(index_dir.as_ref().join(&index_file_name))?;
        let mut buffer_pool = BufferPoolManager::new(config.pool_size, config.lru_k, disk_manager);

        let meta = IndexMetaPage {
            relation_name: relation_name.to_string(),
            attr_byte_offset: attr_byte_offset as u32,
            attr_type: K::ATTR_TYPE,
            root_page_id: INVALID_PAGE_ID,
        };
        let encoded_meta = IndexMetaPageCodec::encode(&meta)?;
        let (header_page_id, page) = buffer_pool.new_page()?;
        debug_assert_eq!(header_page_id, HEADER_PAGE_ID);
        page.set_data(&encoded_meta);
        buffer_pool.unpin_page(header_page_id, true)?;

        // the root starts as an empty interior of level 1; the first insert
        // hangs the first leaf off it
        let (root_page_id, page) = buffer_pool.new_page()?;
        page.set_data(&InteriorPageCodec::encode(&InteriorPage::<K>::new(1)));
        buffer_pool.unpin_page(root_page_id, true)?;

        let mut index = Self {
            buffer_pool,
            header_page_id,
            root_page_id: INVALID_PAGE_ID,
            attr_byte_offset,
            scan: None,
        };
        index.set_root_page_id(root_page_id)?;

        let mut scanner = TableIterator::new(heap);
        while let Some((rid, record)) = scanner.next()? {
            let Some(attr_bytes) = record.get(attr_byte_offset..) else {
                return Err(ChalkDBError::Storage(format!(
                    "Record {:?} is shorter than attribute offset {}",
                    rid, attr_byte_offset
                )));
            };
            let key = K::read_from(attr_bytes)?;
            index.insert(&key, rid)?;
        }

        Ok((index, index_file_name))
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn attr_byte_offset(&self) -> usize {
        self.attr_byte_offset
    }

    /// Root level; 1 means the root's children are leaves.
    pub fn height(&mut self) -> ChalkDBResult<u32> {
        Ok(self.read_interior(self.root_page_id)?.level)
    }

    /// Insert one ⟨key, record-id⟩ entry. Duplicate keys are kept; a new
    /// duplicate lands after the existing equal keys of its leaf.
    pub fn insert(&mut self, key: &K, rid: RecordId) -> ChalkDBResult<()> {
        if let Some((sibling, separator)) = self.insert_rec(self.root_page_id, false, key, rid)? {
            self.grow_root(separator, sibling)?;
        }
        Ok(())
    }

    /// Insert from the raw attribute bytes of a record; `key_bytes` must
    /// hold a value of the configured width.
    pub fn insert_key_bytes(&mut self, key_bytes: &[u8], rid: RecordId) -> ChalkDBResult<()> {
        let key = K::read_from(key_bytes)?;
        self.insert(&key, rid)
    }

    /// Descend to the target leaf and insert, splitting on the way back up.
    /// Returns the new right sibling and its separator key when this node
    /// split, for the caller to absorb.
    fn insert_rec(
        &mut self,
        page_id: PageId,
        is_leaf: bool,
        key: &K,
        rid: RecordId,
    ) -> ChalkDBResult<Option<(PageId, K)>> {
        if is_leaf {
            return self.insert_into_leaf(page_id, key, rid);
        }

        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = InteriorPageCodec::decode::<K>(page.data());
        self.buffer_pool.unpin_page(page_id, false)?;
        let (mut interior, _) = decoded?;

        if interior.children.is_empty() {
            // very first insert: the empty root gets its bootstrap leaf
            let mut leaf = LeafPage::new();
            leaf.insert(*key, rid);
            let (leaf_page_id, page) = self.buffer_pool.new_page()?;
            page.set_data(&LeafPageCodec::encode(&leaf));
            self.buffer_pool.unpin_page(leaf_page_id, true)?;
            debug!("bootstrapped first leaf {} under root {}", leaf_page_id, page_id);

            interior.children.push(leaf_page_id);
            let page = self.buffer_pool.fetch_page(page_id)?;
            page.set_data(&InteriorPageCodec::encode(&interior));
            self.buffer_pool.unpin_page(page_id, true)?;
            return Ok(None);
        }

        let next = interior.child_for_key(key)?;
        let child_is_leaf = interior.level == 1;
        let Some((sibling, separator)) = self.insert_rec(next, child_is_leaf, key, rid)? else {
            return Ok(None);
        };

        // a child split; absorb the promoted separator or split ourselves
        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = InteriorPageCodec::decode::<K>(page.data());
        let (mut interior, _) = match decoded {
            Ok(d) => d,
            Err(e) => {
                self.buffer_pool.unpin_page(page_id, false)?;
                return Err(e);
            }
        };
        if !interior.is_full() {
            interior.insert(separator, sibling);
            page.set_data(&InteriorPageCodec::encode(&interior));
            self.buffer_pool.unpin_page(page_id, true)?;
            return Ok(None);
        }
        self.buffer_pool.unpin_page(page_id, false)?;

        let (right, promoted) = interior.split_insert(separator, sibling);
        let (new_page_id, page) = self.buffer_pool.new_page()?;
        page.set_data(&InteriorPageCodec::encode(&right));
        self.buffer_pool.unpin_page(new_page_id, true)?;
        debug!(
            "split interior {} at level {} into {}",
            page_id, interior.level, new_page_id
        );

        let page = self.buffer_pool.fetch_page(page_id)?;
        page.set_data(&InteriorPageCodec::encode(&interior));
        self.buffer_pool.unpin_page(page_id, true)?;
        Ok(Some((new_page_id, promoted)))
    }

    fn insert_into_leaf(
        &mut self,
        page_id: PageId,
        key: &K,
        rid: RecordId,
    ) -> ChalkDBResult<Option<(PageId, K)>> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = LeafPageCodec::decode::<K>(page.data());
        let (mut leaf, _) = match decoded {
            Ok(d) => d,
            Err(e) => {
                self.buffer_pool.unpin_page(page_id, false)?;
                return Err(e);
            }
        };

        if !leaf.is_full() {
            leaf.insert(*key, rid);
            page.set_data(&LeafPageCodec::encode(&leaf));
            self.buffer_pool.unpin_page(page_id, true)?;
            return Ok(None);
        }
        self.buffer_pool.unpin_page(page_id, false)?;

        // merge the new entry in, keep the lower half, move the rest to a
        // fresh sibling and relink the leaf chain
        let mut right = leaf.split_insert(*key, rid);
        let (new_page_id, page) = self.buffer_pool.new_page()?;
        right.right_sibling = leaf.right_sibling;
        leaf.right_sibling = new_page_id;
        let separator = right.keys[0];
        page.set_data(&LeafPageCodec::encode(&right));
        self.buffer_pool.unpin_page(new_page_id, true)?;
        debug!("split leaf {} into {}", page_id, new_page_id);

        let page = self.buffer_pool.fetch_page(page_id)?;
        page.set_data(&LeafPageCodec::encode(&leaf));
        self.buffer_pool.unpin_page(page_id, true)?;
        Ok(Some((new_page_id, separator)))
    }

    /// The root split: install a new root one level up holding the old root
    /// and its new sibling, and point the header at it.
    fn grow_root(&mut self, separator: K, right_child: PageId) -> ChalkDBResult<()> {
        let old_root = self.root_page_id;
        let level = self.read_interior(old_root)?.level;

        let mut new_root = InteriorPage::new(level + 1);
        new_root.keys.push(separator);
        new_root.children.push(old_root);
        new_root.children.push(right_child);

        let (new_root_id, page) = self.buffer_pool.new_page()?;
        page.set_data(&InteriorPageCodec::encode(&new_root));
        self.buffer_pool.unpin_page(new_root_id, true)?;
        debug!("grew root: {} -> {} (level {})", old_root, new_root_id, level + 1);

        self.set_root_page_id(new_root_id)
    }

    /// Open a range scan positioned at the first entry satisfying the low
    /// bound. `low_op` must be `GT`/`GTE` and `high_op` must be `LT`/`LTE`.
    /// Fails with `NoMatch` when nothing satisfies the low bound. Exactly
    /// one leaf stays pinned until `end_scan`.
    pub fn start_scan(
        &mut self,
        low: &K,
        low_op: ScanOperator,
        high: &K,
        high_op: ScanOperator,
    ) -> ChalkDBResult<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }
        if !matches!(low_op, ScanOperator::GT | ScanOperator::GTE) {
            return Err(ChalkDBError::BadOperator(format!(
                "low operator must be GT or GTE, got {:?}",
                low_op
            )));
        }
        if !matches!(high_op, ScanOperator::LT | ScanOperator::LTE) {
            return Err(ChalkDBError::BadOperator(format!(
                "high operator must be LT or LTE, got {:?}",
                high_op
            )));
        }
        if low.compare(high) == Ordering::Greater {
            return Err(ChalkDBError::BadRange);
        }

        // descend towards the low bound, unpinning each interior before
        // stepping down
        let mut page_id = self.root_page_id;
        let leaf_page_id = loop {
            let interior = self.read_interior(page_id)?;
            if interior.children.is_empty() {
                return Err(ChalkDBError::NoMatch);
            }
            let next = interior.child_for_key(low)?;
            if interior.level == 1 {
                break next;
            }
            page_id = next;
        };

        // walk the leaf chain until an entry satisfies the low bound
        let mut leaf_page_id = leaf_page_id;
        let mut leaf = self.fetch_leaf_pinned(leaf_page_id)?;
        let cursor = loop {
            let idx = if low_op == ScanOperator::GTE {
                leaf.first_not_less(low)
            } else {
                leaf.first_greater(low)
            };
            if idx < leaf.occupancy() {
                break idx;
            }
            let next = leaf.right_sibling;
            self.buffer_pool.unpin_page(leaf_page_id, false)?;
            if next == INVALID_PAGE_ID {
                return Err(ChalkDBError::NoMatch);
            }
            leaf = self.fetch_leaf_pinned(next)?;
            leaf_page_id = next;
        };

        self.scan = Some(ScanState {
            high: *high,
            high_op,
            leaf_page_id,
            leaf,
            cursor,
        });
        Ok(())
    }

    /// Emit the next in-range record id, hopping the sibling chain as leaves
    /// are exhausted. `ScanCompleted` once the high bound is passed.
    pub fn next(&mut self) -> ChalkDBResult<RecordId> {
        let mut scan = self.scan.take().ok_or(ChalkDBError::ScanNotStarted)?;
        let result = self.scan_advance(&mut scan);
        self.scan = Some(scan);
        result
    }

    fn scan_advance(&mut self, scan: &mut ScanState<K>) -> ChalkDBResult<RecordId> {
        if scan.cursor >= scan.leaf.occupancy() {
            // the previous call ran off the end of the last leaf
            return Err(ChalkDBError::ScanCompleted);
        }
        let key = scan.leaf.keys[scan.cursor];
        let past_high = match scan.high_op {
            ScanOperator::LT => key.compare(&scan.high) != Ordering::Less,
            _ => key.compare(&scan.high) == Ordering::Greater,
        };
        if past_high {
            return Err(ChalkDBError::ScanCompleted);
        }

        let rid = scan.leaf.rids[scan.cursor];
        scan.cursor += 1;
        if scan.cursor == scan.leaf.occupancy() && scan.leaf.right_sibling != INVALID_PAGE_ID {
            let next = scan.leaf.right_sibling;
            self.buffer_pool.unpin_page(scan.leaf_page_id, false)?;
            scan.leaf = self.fetch_leaf_pinned(next)?;
            scan.leaf_page_id = next;
            scan.cursor = 0;
        }
        Ok(rid)
    }

    /// Close the scan and release its leaf pin.
    pub fn end_scan(&mut self) -> ChalkDBResult<()> {
        let scan = self.scan.take().ok_or(ChalkDBError::ScanNotStarted)?;
        self.buffer_pool.unpin_page(scan.leaf_page_id, false)?;
        Ok(())
    }

    /// Flush every dirty page of the index file and release it.
    pub fn close(mut self) -> ChalkDBResult<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }
        self.buffer_pool.flush_all_pages()
    }

    fn set_root_page_id(&mut self, page_id: PageId) -> ChalkDBResult<()> {
        let page = self.buffer_pool.fetch_page(self.header_page_id)?;
        let result = IndexMetaPageCodec::decode(page.data()).and_then(|(mut meta, _)| {
            meta.root_page_id = page_id;
            IndexMetaPageCodec::encode(&meta)
        });
        match result {
            Ok(encoded) => {
                page.set_data(&encoded);
                self.buffer_pool.unpin_page(self.header_page_id, true)?;
                self.root_page_id = page_id;
                Ok(())
            }
            Err(e) => {
                self.buffer_pool.unpin_page(self.header_page_id, false)?;
                Err(e)
            }
        }
    }

    fn read_meta(&mut self) -> ChalkDBResult<IndexMetaPage> {
        let page = self.buffer_pool.fetch_page(self.header_page_id)?;
        let decoded = IndexMetaPageCodec::decode(page.data());
        self.buffer_pool.unpin_page(self.header_page_id, false)?;
        Ok(decoded?.0)
    }

    fn read_interior(&mut self, page_id: PageId) -> ChalkDBResult<InteriorPage<K>> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = InteriorPageCodec::decode::<K>(page.data());
        self.buffer_pool.unpin_page(page_id, false)?;
        Ok(decoded?.0)
    }

    fn read_leaf(&mut self, page_id: PageId) -> ChalkDBResult<LeafPage<K>> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = LeafPageCodec::decode::<K>(page.data());
        self.buffer_pool.unpin_page(page_id, false)?;
        Ok(decoded?.0)
    }

    /// Fetch a leaf and leave it pinned; the scan cursor owns the pin.
    fn fetch_leaf_pinned(&mut self, page_id: PageId) -> ChalkDBResult<LeafPage<K>> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let decoded = LeafPageCodec::decode::<K>(page.data());
        match decoded {
            Ok((leaf, _)) => Ok(leaf),
            Err(e) => {
                self.buffer_pool.unpin_page(page_id, false)?;
                Err(e)
            }
        }
    }

    /// Walk the whole tree checking the structural invariants: sorted nodes,
    /// separator ranges, uniform height, minimum occupancy and the leaf
    /// chain; also that the header still names the true root. Returns the
    /// total number of leaf entries.
    pub fn check_integrity(&mut self) -> ChalkDBResult<usize> {
        let meta = self.read_meta()?;
        if meta.root_page_id != self.root_page_id {
            return Err(ChalkDBError::Storage(format!(
                "Header names root {} but the index uses {}",
                meta.root_page_id, self.root_page_id
            )));
        }

        let root = self.read_interior(self.root_page_id)?;
        if root.children.is_empty() {
            return Ok(0);
        }

        let mut leaves: Vec<(PageId, PageId)> = Vec::new();
        let mut total = 0;
        self.check_interior(self.root_page_id, &root, true, None, None, &mut leaves, &mut total)?;

        for pair in leaves.windows(2) {
            if pair[0].1 != pair[1].0 {
                return Err(ChalkDBError::Storage(format!(
                    "Leaf {} links to {} but the next leaf in key order is {}",
                    pair[0].0, pair[0].1, pair[1].0
                )));
            }
        }
        if let Some(&(last, sibling)) = leaves.last() {
            if sibling != INVALID_PAGE_ID {
                return Err(ChalkDBError::Storage(format!(
                    "Rightmost leaf {} does not terminate the chain",
                    last
                )));
            }
        }
        Ok(total)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_interior(
        &mut self,
        page_id: PageId,
        node: &InteriorPage<K>,
        is_root: bool,
        low: Option<K>,
        high: Option<K>,
        leaves: &mut Vec<(PageId, PageId)>,
        total: &mut usize,
    ) -> ChalkDBResult<()> {
        check_sorted(page_id, &node.keys)?;
        check_bounds(page_id, &node.keys, low.as_ref(), high.as_ref())?;
        if !is_root && node.occupancy() < InteriorPage::<K>::capacity() / 2 {
            return Err(ChalkDBError::Storage(format!(
                "Interior {} under-full: {}/{}",
                page_id,
                node.occupancy(),
                InteriorPage::<K>::capacity()
            )));
        }
        if node.children.len() != node.keys.len() + 1 && !(is_root && node.keys.is_empty()) {
            return Err(ChalkDBError::Storage(format!(
                "Interior {} holds {} keys but {} children",
                page_id,
                node.keys.len(),
                node.children.len()
            )));
        }

        // a keyless root has a single bootstrap leaf allowed to be under-full
        let lone_bootstrap_leaf = is_root && node.keys.is_empty();

        for (i, &child_id) in node.children.iter().enumerate() {
            let child_low = if i == 0 { low } else { Some(node.keys[i - 1]) };
            let child_high = if i < node.keys.len() {
                Some(node.keys[i])
            } else {
                high
            };
            if node.level == 1 {
                let leaf = self.read_leaf(child_id)?;
                check_sorted(child_id, &leaf.keys)?;
                check_bounds(child_id, &leaf.keys, child_low.as_ref(), child_high.as_ref())?;
                if leaf.keys.len() != leaf.rids.len() {
                    return Err(ChalkDBError::Storage(format!(
                        "Leaf {} holds {} keys but {} rids",
                        child_id,
                        leaf.keys.len(),
                        leaf.rids.len()
                    )));
                }
                if !lone_bootstrap_leaf && leaf.occupancy() < LeafPage::<K>::capacity() / 2 {
                    return Err(ChalkDBError::Storage(format!(
                        "Leaf {} under-full: {}/{}",
                        child_id,
                        leaf.occupancy(),
                        LeafPage::<K>::capacity()
                    )));
                }
                *total += leaf.occupancy();
                leaves.push((child_id, leaf.right_sibling));
            } else {
                let child = self.read_interior(child_id)?;
                if child.level != node.level - 1 {
                    return Err(ChalkDBError::Storage(format!(
                        "Interior {} at level {} has child {} at level {}",
                        page_id, node.level, child_id, child.level
                    )));
                }
                self.check_interior(child_id, &child, false, child_low, child_high, leaves, total)?;
            }
        }
        Ok(())
    }
}

fn check_sorted<K: IndexKey>(page_id: PageId, keys: &[K]) -> ChalkDBResult<()> {
    for pair in keys.windows(2) {
        if pair[0].compare(&pair[1]) == Ordering::Greater {
            return Err(ChalkDBError::Storage(format!(
                "Node {} keys out of order: {} after {}",
                page_id, pair[1], pair[0]
            )));
        }
    }
    Ok(())
}

fn check_bounds<K: IndexKey>(
    page_id: PageId,
    keys: &[K],
    low: Option<&K>,
    high: Option<&K>,
) -> ChalkDBResult<()> {
    for key in keys {
        if let Some(low) = low {
            if key.compare(low) == Ordering::Less {
                return Err(ChalkDBError::Storage(format!(
                    "Node {} key {} below separator {}",
                    page_id, key, low
                )));
            }
        }
        if let Some(high) = high {
            if key.compare(high) == Ordering::Greater {
                return Err(ChalkDBError::Storage(format!(
                    "Node {} key {} above separator {}",
                    page_id, key, high
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BTreeIndex, ScanOperator};
    use crate::config::BufferPoolConfig;
    use crate::error::{ChalkDBError, ChalkDBResult};
    use crate::index::key::IndexKey;
    use crate::storage::page::index_page::{leaf_capacity, LeafPage};
    use crate::storage::page::table_page::RecordId;
    use crate::storage::table_heap::TableHeap;
    use tempfile::TempDir;

    fn empty_int_index(dir: &TempDir) -> ChalkDBResult<BTreeIndex<i32>> {
        let mut heap = TableHeap::create(dir.path().join("rel"), BufferPoolConfig::default())?;
        let (index, _) =
            BTreeIndex::<i32>::build(dir.path(), "rel", 0, &mut heap, BufferPoolConfig::default())?;
        Ok(index)
    }

    fn collect_scan<K: IndexKey>(
        index: &mut BTreeIndex<K>,
        low: K,
        low_op: ScanOperator,
        high: K,
        high_op: ScanOperator,
    ) -> ChalkDBResult<Vec<RecordId>> {
        index.start_scan(&low, low_op, &high, high_op)?;
        let mut rids = Vec::new();
        loop {
            match index.next() {
                Ok(rid) => rids.push(rid),
                Err(ChalkDBError::ScanCompleted) => break,
                Err(e) => return Err(e),
            }
        }
        index.end_scan()?;
        Ok(rids)
    }

    #[test]
    fn test_build_derives_index_file_name() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut heap = TableHeap::create(dir.path().join("orders"), BufferPoolConfig::default())?;
        let (_, name) = BTreeIndex::<i32>::build(
            dir.path(),
            "orders",
            8,
            &mut heap,
            BufferPoolConfig::default(),
        )?;
        assert_eq!(name, "orders.8");
        assert!(dir.path().join("orders.8").exists());
        Ok(())
    }

    #[test]
    fn test_first_insert_bootstraps_one_leaf() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        assert_eq!(index.check_integrity()?, 0);

        index.insert(&42, RecordId::new(1, 0))?;
        let root = index.read_interior(index.root_page_id())?;
        assert_eq!(root.level, 1);
        assert!(root.keys.is_empty());
        assert_eq!(root.children.len(), 1);
        let leaf = index.read_leaf(root.children[0])?;
        assert_eq!(leaf.keys, vec![42]);
        assert_eq!(index.check_integrity()?, 1);
        Ok(())
    }

    #[test]
    fn test_leaf_at_capacity_minus_one_fits_without_split() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        let capacity = leaf_capacity::<i32>();
        for i in 0..capacity as i32 - 1 {
            index.insert(&i, RecordId::new(1, i as u32))?;
        }
        index.insert(&(capacity as i32 - 1), RecordId::new(1, capacity as u32 - 1))?;
        let root = index.read_interior(index.root_page_id())?;
        assert_eq!(root.children.len(), 1, "a full leaf must not split yet");
        assert_eq!(index.check_integrity()?, capacity);
        Ok(())
    }

    #[test]
    fn test_insert_into_full_leaf_splits_at_midpoint() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        let capacity = leaf_capacity::<i32>();
        for i in 0..=capacity as i32 {
            index.insert(&i, RecordId::new(1, i as u32))?;
        }
        let root = index.read_interior(index.root_page_id())?;
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.keys.len(), 1);
        let right = index.read_leaf(root.children[1])?;
        // the promoted separator is the first key of the new right leaf
        assert_eq!(root.keys[0], right.keys[0]);
        let left = index.read_leaf(root.children[0])?;
        assert_eq!(left.occupancy(), (capacity + 2) / 2);
        assert_eq!(left.right_sibling, root.children[1]);
        assert_eq!(index.check_integrity()?, capacity + 1);
        Ok(())
    }

    #[test]
    fn test_scan_operator_validation() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        index.insert(&1, RecordId::new(1, 0))?;

        assert!(matches!(
            index.start_scan(&0, ScanOperator::LT, &5, ScanOperator::LTE),
            Err(ChalkDBError::BadOperator(_))
        ));
        assert!(matches!(
            index.start_scan(&0, ScanOperator::GTE, &5, ScanOperator::GT),
            Err(ChalkDBError::BadOperator(_))
        ));
        assert!(matches!(
            index.start_scan(&9, ScanOperator::GTE, &5, ScanOperator::LTE),
            Err(ChalkDBError::BadRange)
        ));
        Ok(())
    }

    #[test]
    fn test_scan_lifecycle_errors() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        index.insert(&1, RecordId::new(1, 0))?;

        assert!(matches!(index.next(), Err(ChalkDBError::ScanNotStarted)));
        assert!(matches!(index.end_scan(), Err(ChalkDBError::ScanNotStarted)));

        index.start_scan(&0, ScanOperator::GTE, &9, ScanOperator::LTE)?;
        assert_eq!(index.next()?, RecordId::new(1, 0));
        assert!(matches!(index.next(), Err(ChalkDBError::ScanCompleted)));
        // a completed scan still needs its end_scan
        index.end_scan()?;
        assert!(matches!(index.end_scan(), Err(ChalkDBError::ScanNotStarted)));
        Ok(())
    }

    #[test]
    fn test_scan_on_empty_tree_finds_nothing() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        assert!(matches!(
            index.start_scan(&0, ScanOperator::GTE, &9, ScanOperator::LTE),
            Err(ChalkDBError::NoMatch)
        ));
        Ok(())
    }

    #[test]
    fn test_operator_boundaries() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        for (i, key) in [10, 20, 30].into_iter().enumerate() {
            index.insert(&key, RecordId::new(1, i as u32))?;
        }

        let exclusive = collect_scan(&mut index, 10, ScanOperator::GT, 30, ScanOperator::LT)?;
        assert_eq!(exclusive, vec![RecordId::new(1, 1)]);

        let inclusive = collect_scan(&mut index, 10, ScanOperator::GTE, 30, ScanOperator::LTE)?;
        assert_eq!(
            inclusive,
            vec![
                RecordId::new(1, 0),
                RecordId::new(1, 1),
                RecordId::new(1, 2)
            ]
        );

        // nothing lies strictly above the largest key
        assert!(matches!(
            index.start_scan(&30, ScanOperator::GT, &30, ScanOperator::LTE),
            Err(ChalkDBError::NoMatch)
        ));
        Ok(())
    }

    #[test]
    fn test_smallest_key_needs_gte() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        for (i, key) in [5, 6, 7].into_iter().enumerate() {
            index.insert(&key, RecordId::new(1, i as u32))?;
        }
        let with_equal = collect_scan(&mut index, 5, ScanOperator::GTE, 7, ScanOperator::LTE)?;
        assert_eq!(with_equal.len(), 3);
        let strict = collect_scan(&mut index, 5, ScanOperator::GT, 7, ScanOperator::LTE)?;
        assert_eq!(strict.len(), 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_keys_all_survive() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        for slot in 0..4u32 {
            index.insert(&7, RecordId::new(2, slot))?;
        }
        index.insert(&3, RecordId::new(1, 0))?;
        index.insert(&9, RecordId::new(3, 0))?;

        let sevens = collect_scan(&mut index, 7, ScanOperator::GTE, 7, ScanOperator::LTE)?;
        assert_eq!(sevens.len(), 4);
        for slot in 0..4u32 {
            assert!(sevens.contains(&RecordId::new(2, slot)));
        }
        assert_eq!(index.check_integrity()?, 6);
        Ok(())
    }

    #[test]
    fn test_start_scan_replaces_active_scan() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        for i in 0..10 {
            index.insert(&i, RecordId::new(1, i as u32))?;
        }
        index.start_scan(&0, ScanOperator::GTE, &9, ScanOperator::LTE)?;
        index.next()?;
        // restarting drops the old cursor and its pin
        index.start_scan(&5, ScanOperator::GTE, &9, ScanOperator::LTE)?;
        assert_eq!(index.next()?, RecordId::new(1, 5));
        index.end_scan()?;
        Ok(())
    }

    #[test]
    fn test_insert_key_bytes_checks_width() -> ChalkDBResult<()> {
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        assert!(index.insert_key_bytes(&[1, 2], RecordId::new(1, 0)).is_err());
        index.insert_key_bytes(&5i32.to_ne_bytes(), RecordId::new(1, 0))?;
        let found = collect_scan(&mut index, 5, ScanOperator::GTE, 5, ScanOperator::LTE)?;
        assert_eq!(found, vec![RecordId::new(1, 0)]);
        Ok(())
    }

    #[test]
    fn test_leaf_image_matches_decoded_state() -> ChalkDBResult<()> {
        // the pinned scan image and the on-page bytes must agree
        let dir = TempDir::new().unwrap();
        let mut index = empty_int_index(&dir)?;
        for i in 0..100 {
            index.insert(&i, RecordId::new(1, i as u32))?;
        }
        let root = index.read_interior(index.root_page_id())?;
        let leaf: LeafPage<i32> = index.read_leaf(root.children[0])?;
        assert_eq!(leaf.occupancy(), 100);
        Ok(())
    }
}
