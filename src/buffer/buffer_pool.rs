use crate::buffer::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{ChalkDBError, ChalkDBResult};
use crate::storage::disk_manager::DiskManager;
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use std::collections::HashMap;

/// An in-memory frame holding one disk page.
#[derive(Debug)]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new() -> Self {
        Self {
            data: [0; PAGE_SIZE],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    /// Overwrite the frame with a full page image.
    pub fn set_data(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        self.data.copy_from_slice(data);
    }

    pub fn set_data_from_bytes(&mut self, data: BytesMut) -> ChalkDBResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(ChalkDBError::Internal(format!(
                "Read incorrect amount of data: {} bytes",
                data.len()
            )));
        }
        self.data.copy_from_slice(&data);
        Ok(())
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    page_id: Option<PageId>,
    pin_count: u32,
    is_dirty: bool,
}

/// Bounded cache of pages over the disk manager.
///
/// Every `fetch_page`/`new_page` pins the frame; the caller must pair it with
/// exactly one `unpin_page`, passing `is_dirty = true` iff the page bytes were
/// modified. A pinned frame is never chosen for eviction.
#[derive(Debug)]
pub struct BufferPoolManager {
    pool: Vec<Page>,
    frame_meta: Vec<FrameMeta>,
    page_table: HashMap<PageId, FrameId>,
    replacer: LRUKReplacer,
    free_list: Vec<FrameId>,
    pub disk_manager: DiskManager,
    pool_size: usize,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, k: usize, disk_manager: DiskManager) -> Self {
        let mut pool = Vec::with_capacity(pool_size);
        let mut frame_meta = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            pool.push(Page::new());
            frame_meta.push(FrameMeta {
                page_id: None,
                pin_count: 0,
                is_dirty: false,
            });
            free_list.push(frame_id);
        }

        Self {
            pool,
            frame_meta,
            page_table: HashMap::new(),
            replacer: LRUKReplacer::with_k(pool_size, k),
            free_list,
            disk_manager,
            pool_size,
        }
    }

    /// Allocate a fresh page on disk and pin it in a frame, zero-filled.
    pub fn new_page(&mut self) -> ChalkDBResult<(PageId, &mut Page)> {
        let frame_id = self.victim_frame()?;
        self.flush_frame_if_dirty(frame_id)?;
        if let Some(old_page_id) = self.frame_meta[frame_id].page_id.take() {
            self.page_table.remove(&old_page_id);
        }

        let page_id = match self.disk_manager.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                self.free_list.push(frame_id);
                return Err(e);
            }
        };
        debug!("allocated page {} into frame {}", page_id, frame_id);

        self.pool[frame_id] = Page::new();
        self.frame_meta[frame_id] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            is_dirty: true,
        };
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        Ok((page_id, &mut self.pool[frame_id]))
    }

    /// Pin the page, reading it from disk if it is not resident.
    pub fn fetch_page(&mut self, page_id: PageId) -> ChalkDBResult<&mut Page> {
        if page_id == INVALID_PAGE_ID {
            return Err(ChalkDBError::Internal(
                "Cannot fetch invalid page id 0".to_string(),
            ));
        }

        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let meta = &mut self.frame_meta[frame_id];
            meta.pin_count += 1;
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(&mut self.pool[frame_id]);
        }

        let frame_id = self.victim_frame()?;
        self.flush_frame_if_dirty(frame_id)?;
        if let Some(old_page_id) = self.frame_meta[frame_id].page_id.take() {
            debug!("evicting page {} from frame {}", old_page_id, frame_id);
            self.page_table.remove(&old_page_id);
        }

        let data = match self.disk_manager.read_page(page_id) {
            Ok(data) => data,
            Err(e) => {
                self.free_list.push(frame_id);
                return Err(e);
            }
        };
        self.pool[frame_id].set_data_from_bytes(data)?;
        self.frame_meta[frame_id] = FrameMeta {
            page_id: Some(page_id),
            pin_count: 1,
            is_dirty: false,
        };
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        Ok(&mut self.pool[frame_id])
    }

    /// Release one pin on the page; `is_dirty` records that the caller wrote
    /// to it. Returns false if the page is not resident or was not pinned.
    pub fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> ChalkDBResult<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            warn!("unpin called on page {} not in buffer pool", page_id);
            return Ok(false);
        };
        let meta = &mut self.frame_meta[frame_id];
        if meta.pin_count == 0 {
            warn!("unpin called on page {} with pin count 0", page_id);
            return Ok(false);
        }
        meta.pin_count -= 1;
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true)?;
        }
        Ok(true)
    }

    pub fn flush_page(&mut self, page_id: PageId) -> ChalkDBResult<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.flush_frame_if_dirty(frame_id)?;
        Ok(true)
    }

    pub fn flush_all_pages(&mut self) -> ChalkDBResult<()> {
        for frame_id in 0..self.pool_size {
            self.flush_frame_if_dirty(frame_id)?;
        }
        Ok(())
    }

    fn victim_frame(&mut self) -> ChalkDBResult<FrameId> {
        if let Some(frame_id) = self.free_list.pop() {
            return Ok(frame_id);
        }
        self.replacer.evict().ok_or_else(|| {
            ChalkDBError::Internal(
                "Cannot allocate frame: buffer pool full and no page is evictable".to_string(),
            )
        })
    }

    fn flush_frame_if_dirty(&mut self, frame_id: FrameId) -> ChalkDBResult<()> {
        let meta = &mut self.frame_meta[frame_id];
        if !meta.is_dirty {
            return Ok(());
        }
        let Some(page_id) = meta.page_id else {
            warn!("dirty frame {} has no associated page id", frame_id);
            return Ok(());
        };
        meta.is_dirty = false;
        let data = self.pool[frame_id].data_as_bytes();
        debug!("flushing dirty page {} from frame {}", page_id, frame_id);
        self.disk_manager.write_page(page_id, &data)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            warn!("failed to flush buffer pool on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BufferPoolManager;
    use crate::storage::disk_manager::DiskManager;
    use tempfile::TempDir;

    fn build_pool(pool_size: usize) -> (TempDir, BufferPoolManager) {
        let temp_dir = TempDir::new().unwrap();
        let disk_manager = DiskManager::create(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, BufferPoolManager::new(pool_size, 2, disk_manager))
    }

    #[test]
    fn test_buffer_pool_new_page() {
        let (_dir, mut buffer_pool) = build_pool(3);

        let (page1_id, _) = buffer_pool.new_page().unwrap();
        assert_eq!(page1_id, 1);
        let (page2_id, _) = buffer_pool.new_page().unwrap();
        assert_eq!(page2_id, 2);
        let (page3_id, _) = buffer_pool.new_page().unwrap();
        assert_eq!(page3_id, 3);

        // every frame pinned, nothing evictable
        assert!(buffer_pool.new_page().is_err());

        buffer_pool.unpin_page(page1_id, false).unwrap();
        let (page4_id, _) = buffer_pool.new_page().unwrap();
        assert_eq!(page4_id, 4);

        buffer_pool.unpin_page(page2_id, true).unwrap();
        buffer_pool.unpin_page(page3_id, true).unwrap();
        buffer_pool.unpin_page(page4_id, true).unwrap();
    }

    #[test]
    fn test_buffer_pool_fetch_page_roundtrip() {
        let (_dir, mut buffer_pool) = build_pool(2);

        let (page1_id, page1) = buffer_pool.new_page().unwrap();
        let mut image = vec![0u8; crate::buffer::PAGE_SIZE];
        image[0] = 7;
        image[crate::buffer::PAGE_SIZE - 1] = 9;
        page1.set_data(&image);
        buffer_pool.unpin_page(page1_id, true).unwrap();

        // force page1 out of the pool
        let (page2_id, _) = buffer_pool.new_page().unwrap();
        let (page3_id, _) = buffer_pool.new_page().unwrap();
        buffer_pool.unpin_page(page2_id, true).unwrap();
        buffer_pool.unpin_page(page3_id, true).unwrap();

        let page1 = buffer_pool.fetch_page(page1_id).unwrap();
        assert_eq!(page1.data()[0], 7);
        assert_eq!(page1.data()[crate::buffer::PAGE_SIZE - 1], 9);
        buffer_pool.unpin_page(page1_id, false).unwrap();
    }

    #[test]
    fn test_buffer_pool_unpin_twice_is_noop() {
        let (_dir, mut buffer_pool) = build_pool(2);
        let (page_id, _) = buffer_pool.new_page().unwrap();
        assert!(buffer_pool.unpin_page(page_id, false).unwrap());
        assert!(!buffer_pool.unpin_page(page_id, false).unwrap());
    }
}
