use crate::buffer::{BufferPoolManager, PageId, INVALID_PAGE_ID};
use crate::config::BufferPoolConfig;
use crate::error::{ChalkDBError, ChalkDBResult};
use crate::storage::codec::TablePageCodec;
use crate::storage::disk_manager::DiskManager;
use crate::storage::page::table_page::{RecordId, TablePage};
use std::path::Path;

/// A heap-organized relation: records appended in arrival order across a
/// chain of slotted pages.
#[derive(Debug)]
pub struct TableHeap {
    pub buffer_pool: BufferPoolManager,
    first_page_id: PageId,
    last_page_id: PageId,
}

impl TableHeap {
    pub fn create(path: impl AsRef<Path>, config: BufferPoolConfig) -> ChalkDBResult<Self> {
        let disk_manager = DiskManager::create(path)?;
        let mut buffer_pool = BufferPoolManager::new(config.pool_size, config.lru_k, disk_manager);

        let (first_page_id, page) = buffer_pool.new_page()?;
        page.set_data(&TablePageCodec::encode(&TablePage::new(INVALID_PAGE_ID)));
        buffer_pool.unpin_page(first_page_id, true)?;

        Ok(Self {
            buffer_pool,
            first_page_id,
            last_page_id: first_page_id,
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a record, spilling to a fresh page when the current tail page
    /// is out of room.
    pub fn insert_record(&mut self, record: &[u8]) -> ChalkDBResult<RecordId> {
        let page_id = self.last_page_id;
        let page = self.buffer_pool.fetch_page(page_id)?;
        let (mut table_page, _) = match TablePageCodec::decode(page.data()) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.buffer_pool.unpin_page(page_id, false)?;
                return Err(e);
            }
        };

        if table_page.has_room(record) {
            let slot = table_page.insert_record(record)?;
            page.set_data(&TablePageCodec::encode(&table_page));
            self.buffer_pool.unpin_page(page_id, true)?;
            return Ok(RecordId::new(page_id, slot as u32));
        }
        self.buffer_pool.unpin_page(page_id, false)?;

        if table_page.header.num_records == 0 {
            return Err(ChalkDBError::Storage(format!(
                "Record of {} bytes cannot fit in an empty page",
                record.len()
            )));
        }

        let (new_page_id, new_page) = self.buffer_pool.new_page()?;
        let mut new_table_page = TablePage::new(INVALID_PAGE_ID);
        let slot = new_table_page.insert_record(record)?;
        new_page.set_data(&TablePageCodec::encode(&new_table_page));
        self.buffer_pool.unpin_page(new_page_id, true)?;

        // link the old tail to the new page
        let prev_page = self.buffer_pool.fetch_page(page_id)?;
        let (mut prev_table_page, _) = match TablePageCodec::decode(prev_page.data()) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.buffer_pool.unpin_page(page_id, false)?;
                return Err(e);
            }
        };
        prev_table_page.header.next_page_id = new_page_id;
        prev_page.set_data(&TablePageCodec::encode(&prev_table_page));
        self.buffer_pool.unpin_page(page_id, true)?;

        self.last_page_id = new_page_id;
        Ok(RecordId::new(new_page_id, slot as u32))
    }

    pub fn record(&mut self, rid: RecordId) -> ChalkDBResult<Vec<u8>> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let decoded = TablePageCodec::decode(page.data());
        self.buffer_pool.unpin_page(rid.page_id, false)?;
        let (table_page, _) = decoded?;
        table_page.record(rid.slot as u16).map(<[u8]>::to_vec)
    }
}

/// Walks the relation in physical order, yielding each ⟨record-id, bytes⟩
/// pair; `Ok(None)` marks the end of the relation.
#[derive(Debug)]
pub struct TableIterator<'a> {
    heap: &'a mut TableHeap,
    next_page_id: PageId,
    current: Option<(PageId, TablePage)>,
    slot: u16,
}

impl<'a> TableIterator<'a> {
    pub fn new(heap: &'a mut TableHeap) -> Self {
        let next_page_id = heap.first_page_id;
        Self {
            heap,
            next_page_id,
            current: None,
            slot: 0,
        }
    }

    pub fn next(&mut self) -> ChalkDBResult<Option<(RecordId, Vec<u8>)>> {
        loop {
            if self.current.is_none() {
                if self.next_page_id == INVALID_PAGE_ID {
                    return Ok(None);
                }
                let page_id = self.next_page_id;
                let page = self.heap.buffer_pool.fetch_page(page_id)?;
                let decoded = TablePageCodec::decode(page.data());
                self.heap.buffer_pool.unpin_page(page_id, false)?;
                let (table_page, _) = decoded?;
                self.next_page_id = table_page.header.next_page_id;
                self.current = Some((page_id, table_page));
                self.slot = 0;
            }

            if let Some((page_id, table_page)) = &self.current {
                if self.slot < table_page.header.num_records {
                    let rid = RecordId::new(*page_id, self.slot as u32);
                    let record = table_page.record(self.slot)?.to_vec();
                    self.slot += 1;
                    return Ok(Some((rid, record)));
                }
            }
            self.current = None;
        }
    }
}
