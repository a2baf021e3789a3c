//! On-disk frame format.
//!
//! One frame is one appended log record, little-endian throughout:
//!
//! ```text
//! | total len (4) | tombstone (1) | type id (2) | key len (4) | key bytes |
//! | payload len (4) | payload bytes | crc32 (4) |
//! ```
//!
//! The CRC covers every preceding byte of the frame. Frames are immutable
//! once appended; the newest frame for a key logically shadows all earlier
//! frames sharing that key.

use crate::error::{CaskError, CaskResult};
use crate::key::Key;
use caskdb_codec::TypeId;

/// Fixed bytes before the key region: total len + tombstone + type id + key len.
const PREFIX_SIZE: usize = 4 + 1 + 2 + 4;
/// Payload length field size.
const PAYLOAD_LEN_SIZE: usize = 4;
/// CRC trailer size.
const CRC_SIZE: usize = 4;

/// A decoded log frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Whether this frame marks its key as deleted.
    pub tombstone: bool,
    /// Type id of the payload (zero for tombstones).
    pub type_id: TypeId,
    /// The key this frame belongs to.
    pub key: Key,
    /// Encoded (and possibly encrypted) payload; empty for tombstones.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a put frame.
    #[must_use]
    pub fn put(key: Key, type_id: TypeId, payload: Vec<u8>) -> Self {
        Self {
            tombstone: false,
            type_id,
            key,
            payload,
        }
    }

    /// Creates a tombstone frame.
    #[must_use]
    pub fn tombstone(key: Key) -> Self {
        Self {
            tombstone: true,
            type_id: TypeId::new(0),
            key,
            payload: Vec::new(),
        }
    }

    /// Encodes the frame to bytes, CRC trailer included.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let key_bytes = self.key.encode();
        let total =
            PREFIX_SIZE + key_bytes.len() + PAYLOAD_LEN_SIZE + self.payload.len() + CRC_SIZE;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.push(u8::from(self.tombstone));
        buf.extend_from_slice(&self.type_id.as_u16().to_le_bytes());
        buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&key_bytes);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decodes one frame from the start of `data`.
    ///
    /// # Errors
    ///
    /// - [`CaskError::IncompleteFrame`] if `data` holds fewer bytes than
    ///   the frame declares
    /// - [`CaskError::ChecksumMismatch`] if the CRC trailer disagrees
    /// - [`CaskError::Corruption`] if the lengths are inconsistent or the
    ///   key region is malformed
    ///
    /// During a recovery scan all three are end-of-log signals; see
    /// [`LogStore::scan`](crate::log::LogStore::scan).
    pub fn decode(data: &[u8]) -> CaskResult<Self> {
        if data.len() < 4 {
            return Err(CaskError::IncompleteFrame);
        }

        let total = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if total < PREFIX_SIZE + PAYLOAD_LEN_SIZE + CRC_SIZE {
            return Err(CaskError::corruption("declared frame length too small"));
        }
        if data.len() < total {
            return Err(CaskError::IncompleteFrame);
        }

        // CRC first: everything below trusts the lengths it covers.
        let stored_crc = u32::from_le_bytes([
            data[total - 4],
            data[total - 3],
            data[total - 2],
            data[total - 1],
        ]);
        let computed_crc = crc32fast::hash(&data[..total - CRC_SIZE]);
        if stored_crc != computed_crc {
            return Err(CaskError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let tombstone = match data[4] {
            0 => false,
            1 => true,
            other => {
                return Err(CaskError::corruption(format!(
                    "invalid tombstone flag {other:#04x}"
                )))
            }
        };
        let type_id = TypeId::new(u16::from_le_bytes([data[5], data[6]]));
        let key_len = u32::from_le_bytes([data[7], data[8], data[9], data[10]]) as usize;

        let payload_len_at = PREFIX_SIZE + key_len;
        if payload_len_at + PAYLOAD_LEN_SIZE + CRC_SIZE > total {
            return Err(CaskError::corruption("key length exceeds frame"));
        }

        let key = Key::decode(&data[PREFIX_SIZE..payload_len_at])?;

        let payload_len = u32::from_le_bytes([
            data[payload_len_at],
            data[payload_len_at + 1],
            data[payload_len_at + 2],
            data[payload_len_at + 3],
        ]) as usize;

        let payload_at = payload_len_at + PAYLOAD_LEN_SIZE;
        if payload_at + payload_len + CRC_SIZE != total {
            return Err(CaskError::corruption("payload length inconsistent"));
        }

        let payload = data[payload_at..payload_at + payload_len].to_vec();

        Ok(Self {
            tombstone,
            type_id,
            key,
            payload,
        })
    }

    /// Returns the encoded size of this frame in bytes.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        PREFIX_SIZE + self.key.encode().len() + PAYLOAD_LEN_SIZE + self.payload.len() + CRC_SIZE
    }

    /// Byte offset of the payload within the encoded frame.
    #[must_use]
    pub fn payload_offset(&self) -> usize {
        PREFIX_SIZE + self.key.encode().len() + PAYLOAD_LEN_SIZE
    }
}
