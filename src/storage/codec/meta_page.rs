use crate::buffer::PAGE_SIZE;
use crate::error::{ChalkDBError, ChalkDBResult};
use crate::index::key::AttributeType;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::meta_page::{IndexMetaPage, RELATION_NAME_SIZE};

pub struct IndexMetaPageCodec;

impl IndexMetaPageCodec {
    pub fn encode(meta: &IndexMetaPage) -> ChalkDBResult<Vec<u8>> {
        let name = meta.relation_name.as_bytes();
        if name.len() > RELATION_NAME_SIZE {
            return Err(ChalkDBError::Storage(format!(
                "Relation name {:?} is longer than {} bytes",
                meta.relation_name, RELATION_NAME_SIZE
            )));
        }
        let mut bytes = vec![0u8; PAGE_SIZE];
        bytes[..name.len()].copy_from_slice(name);
        let mut off = RELATION_NAME_SIZE;
        bytes[off..off + 4].copy_from_slice(&CommonCodec::encode_u32(meta.attr_byte_offset));
        off += 4;
        bytes[off..off + 1].copy_from_slice(&CommonCodec::encode_u8(meta.attr_type.tag()));
        off += 1;
        bytes[off..off + 4].copy_from_slice(&CommonCodec::encode_u32(meta.root_page_id));
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> ChalkDBResult<DecodedData<IndexMetaPage>> {
        if bytes.len() != PAGE_SIZE {
            return Err(ChalkDBError::Internal(format!(
                "Header page size is {} instead of {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let name_end = bytes[..RELATION_NAME_SIZE]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RELATION_NAME_SIZE);
        let relation_name = String::from_utf8(bytes[..name_end].to_vec())
            .map_err(|e| ChalkDBError::Storage(format!("Bad relation name in header: {}", e)))?;

        let mut off = RELATION_NAME_SIZE;
        let (attr_byte_offset, _) = CommonCodec::decode_u32(&bytes[off..])?;
        off += 4;
        let (tag, _) = CommonCodec::decode_u8(&bytes[off..])?;
        let attr_type = AttributeType::from_tag(tag)?;
        off += 1;
        let (root_page_id, _) = CommonCodec::decode_u32(&bytes[off..])?;

        Ok((
            IndexMetaPage {
                relation_name,
                attr_byte_offset,
                attr_type,
                root_page_id,
            },
            PAGE_SIZE,
        ))
    }
}
