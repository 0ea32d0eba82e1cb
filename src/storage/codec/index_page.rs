use crate::buffer::{INVALID_PAGE_ID, PAGE_SIZE};
use crate::error::{ChalkDBError, ChalkDBResult};
use crate::index::key::IndexKey;
use crate::storage::codec::{CommonCodec, DecodedData};
use crate::storage::page::index_page::{
    interior_capacity, leaf_capacity, InteriorPage, LeafPage, INTERIOR_HEADER_SIZE,
    LEAF_HEADER_SIZE,
};
use crate::storage::page::table_page::{RecordId, RID_SIZE};

// There is no on-page tag telling a leaf from an interior node; callers pick
// the codec from the descent context (an interior's level says what its
// children are). Both arrays live at fixed offsets with zeroed tails, so a
// page image is byte-identical no matter how its occupancy was reached.

pub struct LeafPageCodec;

impl LeafPageCodec {
    pub fn encode<K: IndexKey>(page: &LeafPage<K>) -> Vec<u8> {
        debug_assert!(page.keys.len() == page.rids.len());
        debug_assert!(page.keys.len() <= leaf_capacity::<K>());
        let mut bytes = vec![0u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(&CommonCodec::encode_u32(page.occupancy() as u32));
        bytes[4..8].copy_from_slice(&CommonCodec::encode_u32(page.right_sibling));

        let rids_base = LEAF_HEADER_SIZE + leaf_capacity::<K>() * K::ENCODED_SIZE;
        for (i, key) in page.keys.iter().enumerate() {
            let off = LEAF_HEADER_SIZE + i * K::ENCODED_SIZE;
            key.write_to(&mut bytes[off..off + K::ENCODED_SIZE]);
        }
        for (i, rid) in page.rids.iter().enumerate() {
            let off = rids_base + i * RID_SIZE;
            bytes[off..off + 4].copy_from_slice(&CommonCodec::encode_u32(rid.page_id));
            bytes[off + 4..off + 8].copy_from_slice(&CommonCodec::encode_u32(rid.slot));
        }
        bytes
    }

    pub fn decode<K: IndexKey>(bytes: &[u8]) -> ChalkDBResult<DecodedData<LeafPage<K>>> {
        if bytes.len() != PAGE_SIZE {
            return Err(ChalkDBError::Internal(format!(
                "Index page size is {} instead of {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let (occupancy, _) = CommonCodec::decode_u32(&bytes[0..])?;
        let (right_sibling, _) = CommonCodec::decode_u32(&bytes[4..])?;
        let capacity = leaf_capacity::<K>();
        if occupancy as usize > capacity {
            return Err(ChalkDBError::Storage(format!(
                "Leaf occupancy {} exceeds capacity {}",
                occupancy, capacity
            )));
        }

        let rids_base = LEAF_HEADER_SIZE + capacity * K::ENCODED_SIZE;
        let mut keys = Vec::with_capacity(occupancy as usize);
        let mut rids = Vec::with_capacity(occupancy as usize);
        for i in 0..occupancy as usize {
            keys.push(K::read_from(&bytes[LEAF_HEADER_SIZE + i * K::ENCODED_SIZE..])?);
            let off = rids_base + i * RID_SIZE;
            let (page_id, _) = CommonCodec::decode_u32(&bytes[off..])?;
            let (slot, _) = CommonCodec::decode_u32(&bytes[off + 4..])?;
            rids.push(RecordId::new(page_id, slot));
        }

        Ok((
            LeafPage {
                right_sibling,
                keys,
                rids,
            },
            PAGE_SIZE,
        ))
    }
}

pub struct InteriorPageCodec;

impl InteriorPageCodec {
    pub fn encode<K: IndexKey>(page: &InteriorPage<K>) -> Vec<u8> {
        debug_assert!(page.keys.len() <= interior_capacity::<K>());
        debug_assert!(page.children.is_empty() || page.children.len() == page.keys.len() + 1);
        let mut bytes = vec![0u8; PAGE_SIZE];
        bytes[0..4].copy_from_slice(&CommonCodec::encode_u32(page.level));
        bytes[4..8].copy_from_slice(&CommonCodec::encode_u32(page.occupancy() as u32));

        let children_base = INTERIOR_HEADER_SIZE + interior_capacity::<K>() * K::ENCODED_SIZE;
        for (i, key) in page.keys.iter().enumerate() {
            let off = INTERIOR_HEADER_SIZE + i * K::ENCODED_SIZE;
            key.write_to(&mut bytes[off..off + K::ENCODED_SIZE]);
        }
        for (i, child) in page.children.iter().enumerate() {
            let off = children_base + i * 4;
            bytes[off..off + 4].copy_from_slice(&CommonCodec::encode_u32(*child));
        }
        bytes
    }

    pub fn decode<K: IndexKey>(bytes: &[u8]) -> ChalkDBResult<DecodedData<InteriorPage<K>>> {
        if bytes.len() != PAGE_SIZE {
            return Err(ChalkDBError::Internal(format!(
                "Index page size is {} instead of {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let (level, _) = CommonCodec::decode_u32(&bytes[0..])?;
        let (occupancy, _) = CommonCodec::decode_u32(&bytes[4..])?;
        let capacity = interior_capacity::<K>();
        if occupancy as usize > capacity {
            return Err(ChalkDBError::Storage(format!(
                "Interior occupancy {} exceeds capacity {}",
                occupancy, capacity
            )));
        }

        let children_base = INTERIOR_HEADER_SIZE + capacity * K::ENCODED_SIZE;
        let mut keys = Vec::with_capacity(occupancy as usize);
        for i in 0..occupancy as usize {
            keys.push(K::read_from(
                &bytes[INTERIOR_HEADER_SIZE + i * K::ENCODED_SIZE..],
            )?);
        }

        // occupancy + 1 children when any key is present; the degenerate
        // empty root has either a lone bootstrap child or none at all
        let child_count = if occupancy > 0 {
            occupancy as usize + 1
        } else {
            let (first, _) = CommonCodec::decode_u32(&bytes[children_base..])?;
            usize::from(first != INVALID_PAGE_ID)
        };
        let mut children = Vec::with_capacity(child_count);
        for i in 0..child_count {
            let (child, _) = CommonCodec::decode_u32(&bytes[children_base + i * 4..])?;
            children.push(child);
        }

        Ok((
            InteriorPage {
                level,
                keys,
                children,
            },
            PAGE_SIZE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{InteriorPageCodec, LeafPageCodec};
    use crate::buffer::PAGE_SIZE;
    use crate::index::key::StringKey;
    use crate::storage::page::index_page::{InteriorPage, LeafPage};
    use crate::storage::page::table_page::RecordId;

    #[test]
    fn test_leaf_page_codec() {
        let mut leaf = LeafPage::new();
        leaf.right_sibling = 17;
        leaf.insert(3i32, RecordId::new(3, 0));
        leaf.insert(1i32, RecordId::new(1, 4));
        leaf.insert(2i32, RecordId::new(2, 2));

        let encoded = LeafPageCodec::encode(&leaf);
        assert_eq!(encoded.len(), PAGE_SIZE);
        let (decoded, _) = LeafPageCodec::decode::<i32>(&encoded).unwrap();
        assert_eq!(decoded, leaf);
    }

    #[test]
    fn test_interior_page_codec() {
        let mut node = InteriorPage::new(2);
        node.children.push(5);
        node.insert(StringKey::from_ascii("beta").unwrap(), 6);
        node.insert(StringKey::from_ascii("alpha").unwrap(), 7);

        let encoded = InteriorPageCodec::encode(&node);
        let (decoded, _) = InteriorPageCodec::decode::<StringKey>(&encoded).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_interior_codec_degenerate_root() {
        // freshly created: no keys, no children
        let empty = InteriorPage::<i32>::new(1);
        let (decoded, _) = InteriorPageCodec::decode::<i32>(&InteriorPageCodec::encode(&empty))
            .unwrap();
        assert!(decoded.keys.is_empty());
        assert!(decoded.children.is_empty());

        // after the first insert: one bootstrap child, still no keys
        let mut bootstrapped = InteriorPage::<i32>::new(1);
        bootstrapped.children.push(9);
        let (decoded, _) =
            InteriorPageCodec::decode::<i32>(&InteriorPageCodec::encode(&bootstrapped)).unwrap();
        assert_eq!(decoded.children, vec![9]);
        assert!(decoded.keys.is_empty());
    }

    #[test]
    fn test_codec_rejects_short_buffer() {
        assert!(LeafPageCodec::decode::<i32>(&[0u8; 16]).is_err());
        assert!(InteriorPageCodec::decode::<i32>(&[0u8; 16]).is_err());
    }
}
