use std::fmt;
use std::hash::{Hash, Hasher};

use twox_hash::XxHash32;

use crate::error::{IndexError, IndexResult};
use crate::page::{BUCKET_CAPACITY, RID_SIZE};

const TAG_INTEGER: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STRING: u8 = 3;

const TAG_SIZE: usize = 1;
const FIXED_PAYLOAD_SIZE: usize = 4;
const STRING_LEN_SIZE: usize = 2;

const HASH_SEED: u32 = 0x1d8e_4e27;

/// Largest canonical key encoding accepted by the index: one such entry
/// (key plus RID) fills an empty bucket page exactly.
pub const fn max_encoded_size() -> usize {
    BUCKET_CAPACITY - RID_SIZE
}

/// Longest string key, in UTF-8 bytes.
pub const fn max_string_len() -> usize {
    max_encoded_size() - TAG_SIZE - STRING_LEN_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Integer,
    Float,
    String,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Integer => "integer",
            KeyType::Float => "float",
            KeyType::String => "string",
        };
        f.write_str(name)
    }
}

/// A search key of one of the three supported column types.
///
/// Floats compare by bit pattern: `NaN` equals an identically encoded `NaN`
/// and `0.0` differs from `-0.0`. That keeps equality, hashing and the
/// canonical encoding in agreement.
#[derive(Debug, Clone)]
pub enum SearchKey {
    Integer(i32),
    Float(f32),
    String(String),
}

impl SearchKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            SearchKey::Integer(_) => KeyType::Integer,
            SearchKey::Float(_) => KeyType::Float,
            SearchKey::String(_) => KeyType::String,
        }
    }

    /// Size of the canonical encoding, computed without encoding.
    pub fn encoded_len(&self) -> usize {
        match self {
            SearchKey::Integer(_) | SearchKey::Float(_) => TAG_SIZE + FIXED_PAYLOAD_SIZE,
            SearchKey::String(text) => TAG_SIZE + STRING_LEN_SIZE + text.len(),
        }
    }

    /// Canonical encoding: tag byte, then a 4-byte little-endian payload for
    /// integers and floats or a u16 length plus UTF-8 bytes for strings.
    pub fn encode(&self) -> IndexResult<Vec<u8>> {
        let size = self.encoded_len();
        if size > max_encoded_size() {
            return Err(IndexError::InvalidKey {
                size,
                max: max_encoded_size(),
            });
        }
        let mut buffer = Vec::with_capacity(size);
        match self {
            SearchKey::Integer(value) => {
                buffer.push(TAG_INTEGER);
                buffer.extend_from_slice(&value.to_le_bytes());
            }
            SearchKey::Float(value) => {
                buffer.push(TAG_FLOAT);
                buffer.extend_from_slice(&value.to_bits().to_le_bytes());
            }
            SearchKey::String(text) => {
                buffer.push(TAG_STRING);
                buffer.extend_from_slice(&(text.len() as u16).to_le_bytes());
                buffer.extend_from_slice(text.as_bytes());
            }
        }
        Ok(buffer)
    }

    /// Exact inverse of [`encode`](Self::encode); `bytes` must hold one key
    /// and nothing else.
    pub fn decode(bytes: &[u8]) -> IndexResult<Self> {
        let len = encoded_len_at(bytes)?;
        if len != bytes.len() {
            return Err(IndexError::MalformedKey(format!(
                "{} trailing bytes after key",
                bytes.len() - len
            )));
        }
        match bytes[0] {
            TAG_INTEGER => Ok(SearchKey::Integer(i32::from_le_bytes(fixed_payload(bytes)))),
            TAG_FLOAT => Ok(SearchKey::Float(f32::from_bits(u32::from_le_bytes(
                fixed_payload(bytes),
            )))),
            _ => {
                let text = std::str::from_utf8(&bytes[TAG_SIZE + STRING_LEN_SIZE..])
                    .map_err(|_| IndexError::MalformedKey("invalid utf8 string key".to_string()))?;
                Ok(SearchKey::String(text.to_string()))
            }
        }
    }

    /// Directory hash of this key. Oversized keys still hash, so a scan for a
    /// key that can never be stored simply finds nothing.
    pub fn hash_code(&self) -> u32 {
        match self.encode() {
            Ok(bytes) => hash_bytes(&bytes),
            Err(_) => {
                let mut hasher = XxHash32::with_seed(HASH_SEED);
                hasher.write_u8(TAG_STRING);
                if let SearchKey::String(text) = self {
                    hasher.write(text.as_bytes());
                }
                hasher.finish() as u32
            }
        }
    }
}

/// xxHash32 over a canonical encoding. The tag byte is part of the input, so
/// equal payloads of different key types hash independently.
pub fn hash_bytes(encoded: &[u8]) -> u32 {
    XxHash32::oneshot(HASH_SEED, encoded)
}

/// Length of the encoded key that starts at `bytes[0]`. Keys are
/// self-delimiting, which lets bucket pages pack them back to back.
pub(crate) fn encoded_len_at(bytes: &[u8]) -> IndexResult<usize> {
    let tag = *bytes
        .first()
        .ok_or_else(|| IndexError::MalformedKey("empty key".to_string()))?;
    let len = match tag {
        TAG_INTEGER | TAG_FLOAT => TAG_SIZE + FIXED_PAYLOAD_SIZE,
        TAG_STRING => {
            if bytes.len() < TAG_SIZE + STRING_LEN_SIZE {
                return Err(IndexError::MalformedKey(
                    "truncated string length".to_string(),
                ));
            }
            TAG_SIZE + STRING_LEN_SIZE + u16::from_le_bytes([bytes[1], bytes[2]]) as usize
        }
        other => {
            return Err(IndexError::MalformedKey(format!(
                "unknown key tag {}",
                other
            )))
        }
    };
    if len > bytes.len() {
        return Err(IndexError::MalformedKey(format!(
            "key needs {} bytes, {} available",
            len,
            bytes.len()
        )));
    }
    Ok(len)
}

fn fixed_payload(bytes: &[u8]) -> [u8; FIXED_PAYLOAD_SIZE] {
    let mut payload = [0u8; FIXED_PAYLOAD_SIZE];
    payload.copy_from_slice(&bytes[TAG_SIZE..TAG_SIZE + FIXED_PAYLOAD_SIZE]);
    payload
}

impl PartialEq for SearchKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SearchKey::Integer(left), SearchKey::Integer(right)) => left == right,
            (SearchKey::Float(left), SearchKey::Float(right)) => left.to_bits() == right.to_bits(),
            (SearchKey::String(left), SearchKey::String(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for SearchKey {}

impl Hash for SearchKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_type().hash(state);
        match self {
            SearchKey::Integer(value) => value.hash(state),
            SearchKey::Float(value) => value.to_bits().hash(state),
            SearchKey::String(text) => text.hash(state),
        }
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKey::Integer(value) => write!(f, "{}", value),
            SearchKey::Float(value) => write!(f, "{}", value),
            SearchKey::String(text) if text.len() > 32 => {
                let cut = (0..=32).rev().find(|&idx| text.is_char_boundary(idx)).unwrap_or(0);
                write!(f, "\"{}...\" ({} bytes)", &text[..cut], text.len())
            }
            SearchKey::String(text) => write!(f, "\"{}\"", text),
        }
    }
}

impl From<i32> for SearchKey {
    fn from(value: i32) -> Self {
        SearchKey::Integer(value)
    }
}

impl From<f32> for SearchKey {
    fn from(value: f32) -> Self {
        SearchKey::Float(value)
    }
}

impl From<&str> for SearchKey {
    fn from(value: &str) -> Self {
        SearchKey::String(value.to_string())
    }
}

impl From<String> for SearchKey {
    fn from(value: String) -> Self {
        SearchKey::String(value)
    }
}
