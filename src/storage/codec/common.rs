use crate::error::{ChalkDBError, ChalkDBResult};
use crate::storage::codec::DecodedData;

/// Fixed-width scalar plumbing for the page codecs.
///
/// Everything is written in the byte order of the building host, like the
/// keys themselves; page files are not portable across hosts.
pub struct CommonCodec;

impl CommonCodec {
    pub fn encode_u8(data: u8) -> Vec<u8> {
        data.to_ne_bytes().to_vec()
    }

    pub fn decode_u8(bytes: &[u8]) -> ChalkDBResult<DecodedData<u8>> {
        if bytes.is_empty() {
            return Err(ChalkDBError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                1
            )));
        }
        Ok((u8::from_ne_bytes([bytes[0]]), 1))
    }

    pub fn encode_u16(data: u16) -> Vec<u8> {
        data.to_ne_bytes().to_vec()
    }

    pub fn decode_u16(bytes: &[u8]) -> ChalkDBResult<DecodedData<u16>> {
        if bytes.len() < 2 {
            return Err(ChalkDBError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                2
            )));
        }
        Ok((u16::from_ne_bytes([bytes[0], bytes[1]]), 2))
    }

    pub fn encode_u32(data: u32) -> Vec<u8> {
        data.to_ne_bytes().to_vec()
    }

    pub fn decode_u32(bytes: &[u8]) -> ChalkDBResult<DecodedData<u32>> {
        if bytes.len() < 4 {
            return Err(ChalkDBError::Internal(format!(
                "bytes length {} is less than {}",
                bytes.len(),
                4
            )));
        }
        let data = [bytes[0], bytes[1], bytes[2], bytes[3]];
        Ok((u32::from_ne_bytes(data), 4))
    }
}
