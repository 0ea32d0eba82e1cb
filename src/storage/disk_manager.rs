use crate::buffer::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{ChalkDBError, ChalkDBResult};
use bytes::BytesMut;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

static EMPTY_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

/// A file of fixed-size pages addressed by positive page ids starting at 1.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    next_page_id: PageId,
}

impl DiskManager {
    /// Create the file, discarding any previous content.
    pub fn create(path: impl AsRef<Path>) -> ChalkDBResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        Ok(Self {
            file,
            next_page_id: 1,
        })
    }

    /// Open an existing page file.
    pub fn open(path: impl AsRef<Path>) -> ChalkDBResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        if file_len % PAGE_SIZE as u64 != 0 {
            return Err(ChalkDBError::Storage(format!(
                "page file size {} is not a multiple of {}",
                file_len, PAGE_SIZE
            )));
        }
        let next_page_id = (file_len / PAGE_SIZE as u64) as PageId + 1;
        debug!("opened page file with next page id {}", next_page_id);
        Ok(Self { file, next_page_id })
    }

    pub fn read_page(&mut self, page_id: PageId) -> ChalkDBResult<BytesMut> {
        self.check_page_id(page_id, "read_page")?;
        let mut data = BytesMut::zeroed(PAGE_SIZE);
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.read_exact(&mut data)?;
        Ok(data)
    }

    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> ChalkDBResult<()> {
        self.check_page_id(page_id, "write_page")?;
        if data.len() != PAGE_SIZE {
            return Err(ChalkDBError::Internal(format!(
                "page image is {} bytes instead of {}",
                data.len(),
                PAGE_SIZE
            )));
        }
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    /// Extend the file by one zeroed page and return its id.
    pub fn allocate_page(&mut self) -> ChalkDBResult<PageId> {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.write_all(&EMPTY_PAGE)?;
        Ok(page_id)
    }

    pub fn num_pages(&self) -> u32 {
        self.next_page_id - 1
    }

    fn page_offset(page_id: PageId) -> u64 {
        (page_id as u64 - 1) * PAGE_SIZE as u64
    }

    fn check_page_id(&self, page_id: PageId, op: &str) -> ChalkDBResult<()> {
        if page_id == INVALID_PAGE_ID || page_id >= self.next_page_id {
            return Err(ChalkDBError::Storage(format!(
                "{}: page id {} out of range",
                op, page_id
            )));
        }
        Ok(())
    }
}
