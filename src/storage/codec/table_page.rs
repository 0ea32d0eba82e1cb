use crate::buffer::PAGE_SIZE;
use crate::error::{ChalkDBError, ChalkDBResult};
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::table_page::{
    RecordSlot, TablePage, TablePageHeader, RECORD_SLOT_SIZE, TABLE_PAGE_HEADER_SIZE,
};

pub struct TablePageCodec;

impl TablePageCodec {
    pub fn encode(page: &TablePage) -> Vec<u8> {
        let mut bytes = page.data.to_vec();
        bytes[0..4].copy_from_slice(&CommonCodec::encode_u32(page.header.next_page_id));
        bytes[4..6].copy_from_slice(&CommonCodec::encode_u16(page.header.num_records));
        for (i, slot) in page.header.slots.iter().enumerate() {
            let off = TABLE_PAGE_HEADER_SIZE + i * RECORD_SLOT_SIZE;
            bytes[off..off + 2].copy_from_slice(&CommonCodec::encode_u16(slot.offset));
            bytes[off + 2..off + 4].copy_from_slice(&CommonCodec::encode_u16(slot.size));
        }
        bytes
    }

    pub fn decode(bytes: &[u8]) -> ChalkDBResult<DecodedData<TablePage>> {
        if bytes.len() != PAGE_SIZE {
            return Err(ChalkDBError::Internal(format!(
                "Table page size is {} instead of {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let (next_page_id, _) = CommonCodec::decode_u32(&bytes[0..])?;
        let (num_records, _) = CommonCodec::decode_u16(&bytes[4..])?;

        let mut slots = Vec::with_capacity(num_records as usize);
        for i in 0..num_records as usize {
            let off = TABLE_PAGE_HEADER_SIZE + i * RECORD_SLOT_SIZE;
            let (offset, _) = CommonCodec::decode_u16(&bytes[off..])?;
            let (size, _) = CommonCodec::decode_u16(&bytes[off + 2..])?;
            if offset as usize + size as usize > PAGE_SIZE {
                return Err(ChalkDBError::Storage(format!(
                    "Record slot {} points past the page end",
                    i
                )));
            }
            slots.push(RecordSlot { offset, size });
        }

        let mut data = [0u8; PAGE_SIZE];
        data.copy_from_slice(bytes);
        Ok((
            TablePage {
                header: TablePageHeader {
                    next_page_id,
                    num_records,
                    slots,
                },
                data,
            },
            PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::TablePageCodec;
    use crate::buffer::INVALID_PAGE_ID;
    use crate::storage::page::table_page::TablePage;

    #[test]
    fn test_table_page_codec() {
        let mut page = TablePage::new(INVALID_PAGE_ID);
        page.insert_record(b"first record").unwrap();
        page.insert_record(b"second").unwrap();

        let encoded = TablePageCodec::encode(&page);
        let (decoded, _) = TablePageCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.header, page.header);
        assert_eq!(decoded.record(0).unwrap(), b"first record");
        assert_eq!(decoded.record(1).unwrap(), b"second");
    }
}
