//! Keys and the meta key codec
//!
//! The keyspace is a flat, lexicographically ordered byte space. Two levels
//! of meta records index it:
//!
//! - meta2 records (`\x00\x00meta2<key>`) describe user ranges
//! - meta1 records (`\x00\x00meta1<key>`) describe meta2 ranges
//!
//! The range holding the meta1 records is the first range, which is
//! discovered out of band. A range's record lives at
//! `range_meta_key(range.end_key)`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

/// Prefix of meta1 records (index meta2 ranges)
pub const META1_PREFIX: &[u8] = b"\x00\x00meta1";
/// Prefix of meta2 records (index user ranges)
pub const META2_PREFIX: &[u8] = b"\x00\x00meta2";

const KEY_MAX_BYTES: &[u8] = b"\xff\xff";

/// The global minimum key (empty)
pub const KEY_MIN: Key = Key(Bytes::from_static(b""));
/// The global maximum key
pub const KEY_MAX: Key = Key(Bytes::from_static(KEY_MAX_BYTES));
/// Upper bound of the meta1 record space
pub const META1_KEY_MAX: Key = Key(Bytes::from_static(b"\x00\x00meta1\xff\xff"));
/// Upper bound of the meta2 record space
pub const META2_KEY_MAX: Key = Key(Bytes::from_static(b"\x00\x00meta2\xff\xff"));

/// An addressing key: an opaque, totally ordered byte string
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Bytes);

impl Key {
    /// Create a key from anything convertible to bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Create a key by concatenating a prefix and a suffix
    #[must_use]
    pub fn with_prefix(prefix: &[u8], suffix: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(prefix.len() + suffix.len());
        buf.put_slice(prefix);
        buf.put_slice(suffix);
        Self(buf.freeze())
    }

    /// Parse a key written with `\xNN` escapes (the inverse of `Display`)
    pub fn parse_escaped(s: &str) -> Result<Self> {
        let raw = s.as_bytes();
        let mut out = BytesMut::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'\\' {
                match raw.get(i + 1) {
                    Some(b'\\') => {
                        out.put_u8(b'\\');
                        i += 2;
                    }
                    Some(b'x') => {
                        let hex = raw
                            .get(i + 2..i + 4)
                            .and_then(|h| std::str::from_utf8(h).ok())
                            .and_then(|h| u8::from_str_radix(h, 16).ok())
                            .ok_or_else(|| Error::InvalidKey(format!("bad escape in {s:?}")))?;
                        out.put_u8(hex);
                        i += 4;
                    }
                    _ => return Err(Error::InvalidKey(format!("bad escape in {s:?}"))),
                }
            } else {
                out.put_u8(raw[i]);
                i += 1;
            }
        }
        Ok(Self(out.freeze()))
    }

    /// The immediate successor of this key (`key + \x00`)
    #[must_use]
    pub fn next(&self) -> Self {
        Self::with_prefix(&self.0, &[0])
    }

    /// True if this is the global minimum key
    #[must_use]
    pub fn is_min(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The key with `len` leading bytes removed
    fn suffix(&self, len: usize) -> Self {
        Self(self.0.slice(len..))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self(Bytes::from(b))
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            match b {
                b'\\' => f.write_str("\\\\")?,
                0x20..=0x7e => write!(f, "{}", b as char)?,
                _ => write!(f, "\\x{b:02x}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(\"{self}\")")
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_escaped(&s).map_err(serde::de::Error::custom)
    }
}

/// Which level of the hierarchy a key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaLevel {
    /// A key of the first range: the meta1 records and every other key
    /// sorting below the meta2 records
    Meta1,
    /// A meta2 record key
    Meta2,
    /// An ordinary user key
    User,
}

/// Classify a key by the meta level it belongs to.
///
/// Levels partition the keyspace in key order (first range, meta2 records,
/// user keys), which keeps `range_meta_key` monotone across levels.
#[must_use]
pub fn meta_level(key: &Key) -> MetaLevel {
    if key.has_prefix(META2_PREFIX) {
        MetaLevel::Meta2
    } else if key.as_bytes() < META2_PREFIX {
        MetaLevel::Meta1
    } else {
        MetaLevel::User
    }
}

/// Map a key to the key of the meta record that indexes the range holding it.
///
/// Order preserving within a level. User keys map to meta2 keys, meta2 keys
/// to meta1 keys and meta1 keys to `KEY_MIN`, so three applications reach
/// `KEY_MIN` from any key.
#[must_use]
pub fn range_meta_key(key: &Key) -> Key {
    match meta_level(key) {
        MetaLevel::User => Key::with_prefix(META2_PREFIX, key.as_bytes()),
        MetaLevel::Meta2 => Key::with_prefix(META1_PREFIX, key.suffix(META2_PREFIX.len()).as_bytes()),
        MetaLevel::Meta1 => KEY_MIN,
    }
}

/// Inverse of `range_meta_key` for meta record keys: the addressing key a
/// meta record key stands for. Returns `None` for user keys and `KEY_MIN`.
#[must_use]
pub fn meta_key_target(meta_key: &Key) -> Option<Key> {
    if meta_key.has_prefix(META2_PREFIX) {
        Some(meta_key.suffix(META2_PREFIX.len()))
    } else if meta_key.has_prefix(META1_PREFIX) {
        Some(Key::with_prefix(META2_PREFIX, &meta_key.as_bytes()[META1_PREFIX.len()..]))
    } else {
        None
    }
}
