//! Cask keys.

use crate::error::{CaskError, CaskResult};
use std::fmt;

/// Wire tag for integer keys.
const KEY_TAG_INT: u8 = 0x00;
/// Wire tag for text keys.
const KEY_TAG_TEXT: u8 = 0x01;

/// A cask key: a non-negative integer or a UTF-8 string.
///
/// Both kinds coexist in one namespace per cask. Integer keys are the
/// currency of [`Cask::add`](crate::Cask::add) auto-increment allocation;
/// text keys are arbitrary UTF-8.
///
/// The ordering (integers first, then text, each ascending) is stable and
/// is the iteration order used by compaction and key listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// A non-negative integer key.
    Int(u32),
    /// A UTF-8 text key.
    Text(String),
}

impl Key {
    /// Encodes the key into the frame's key-bytes region.
    ///
    /// A one-byte tag keeps the two key spaces unambiguous: `0x00` is
    /// followed by a little-endian `u32`, `0x01` by UTF-8 text.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Int(n) => {
                let mut buf = Vec::with_capacity(5);
                buf.push(KEY_TAG_INT);
                buf.extend_from_slice(&n.to_le_bytes());
                buf
            }
            Key::Text(s) => {
                let mut buf = Vec::with_capacity(1 + s.len());
                buf.push(KEY_TAG_TEXT);
                buf.extend_from_slice(s.as_bytes());
                buf
            }
        }
    }

    /// Decodes a key from the frame's key-bytes region.
    ///
    /// # Errors
    ///
    /// Returns a corruption error for an empty region, an unknown tag,
    /// a malformed integer, or invalid UTF-8.
    pub fn decode(bytes: &[u8]) -> CaskResult<Self> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| CaskError::corruption("empty key"))?;

        match tag {
            KEY_TAG_INT => {
                let raw: [u8; 4] = rest
                    .try_into()
                    .map_err(|_| CaskError::corruption("integer key is not 4 bytes"))?;
                Ok(Key::Int(u32::from_le_bytes(raw)))
            }
            KEY_TAG_TEXT => {
                let text = std::str::from_utf8(rest)
                    .map_err(|_| CaskError::corruption("key is not valid UTF-8"))?;
                Ok(Key::Text(text.to_string()))
            }
            other => Err(CaskError::corruption(format!("unknown key tag {other:#04x}"))),
        }
    }

    /// Returns the integer value if this is an integer key.
    #[must_use]
    pub fn as_int(&self) -> Option<u32> {
        match self {
            Key::Int(n) => Some(*n),
            Key::Text(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_key_roundtrip() {
        for n in [0u32, 1, 41, u32::MAX] {
            let key = Key::Int(n);
            assert_eq!(Key::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn text_key_roundtrip() {
        for s in ["", "a", "hello world", "日本語"] {
            let key = Key::from(s);
            assert_eq!(Key::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn empty_region_is_corrupt() {
        assert!(matches!(Key::decode(&[]), Err(CaskError::Corruption { .. })));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        assert!(matches!(
            Key::decode(&[0x7F, 1, 2]),
            Err(CaskError::Corruption { .. })
        ));
    }

    #[test]
    fn short_int_key_is_corrupt() {
        assert!(matches!(
            Key::decode(&[KEY_TAG_INT, 1, 2]),
            Err(CaskError::Corruption { .. })
        ));
    }

    #[test]
    fn ordering_ints_before_text() {
        let mut keys = vec![Key::from("a"), Key::Int(5), Key::from("0"), Key::Int(0)];
        keys.sort();
        assert_eq!(
            keys,
            vec![Key::Int(0), Key::Int(5), Key::from("0"), Key::from("a")]
        );
    }
}
