//! Range descriptor types
//!
//! A range descriptor names the half-open interval `[start_key, end_key)` a
//! range owns, plus the replica placement the cache carries but never
//! interprets.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::Key;

/// Unique identifier for a range
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[display("r{_0}")]
pub struct RangeId(u64);

impl RangeId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Identifier of a node in the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[display("n{_0}")]
pub struct NodeId(u32);

/// Identifier of a store (disk) on a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[display("s{_0}")]
pub struct StoreId(u32);

/// Identifier of a replica within its range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[display("{_0}")]
pub struct ReplicaId(u32);

/// Location of one replica of a range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaDescriptor {
    pub node_id: NodeId,
    pub store_id: StoreId,
    pub replica_id: ReplicaId,
}

impl ReplicaDescriptor {
    #[must_use]
    pub const fn new(node_id: NodeId, store_id: StoreId, replica_id: ReplicaId) -> Self {
        Self {
            node_id,
            store_id,
            replica_id,
        }
    }
}

/// Describes the key interval owned by a range.
///
/// Descriptors are immutable values. Equality is value equality over the
/// interval and the payload (`range_id`, `replicas`); two descriptors for
/// the same interval but different replica sets are not equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: RangeId,
    pub start_key: Key,
    pub end_key: Key,
    #[serde(default)]
    pub replicas: Vec<ReplicaDescriptor>,
}

impl RangeDescriptor {
    /// Create a descriptor with no replicas
    #[must_use]
    pub fn new(range_id: RangeId, start_key: impl Into<Key>, end_key: impl Into<Key>) -> Self {
        Self {
            range_id,
            start_key: start_key.into(),
            end_key: end_key.into(),
            replicas: Vec::new(),
        }
    }

    /// Set the replica set
    #[must_use]
    pub fn with_replicas(mut self, replicas: Vec<ReplicaDescriptor>) -> Self {
        self.replicas = replicas;
        self
    }

    /// `start_key <= key < end_key`
    #[must_use]
    pub fn contains_key(&self, key: &Key) -> bool {
        self.start_key <= *key && *key < self.end_key
    }

    /// `start_key < key <= end_key`: the range that ends at `key`
    #[must_use]
    pub fn contains_key_inclusive(&self, key: &Key) -> bool {
        self.start_key < *key && *key <= self.end_key
    }

    /// Containment under the requested mode
    #[must_use]
    pub fn contains_key_for_mode(&self, key: &Key, inclusive: bool) -> bool {
        if inclusive {
            self.contains_key_inclusive(key)
        } else {
            self.contains_key(key)
        }
    }

    /// True if `[start_key, end_key)` intersects `other`'s interval
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_key < other.end_key && other.start_key < self.end_key
    }
}

impl fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[\"{}\", \"{}\")", self.range_id, self.start_key, self.end_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KEY_MAX, KEY_MIN};

    fn desc(start: &str, end: &str) -> RangeDescriptor {
        RangeDescriptor::new(RangeId::new(1), start, end)
    }

    #[test]
    fn test_contains_key_is_half_open() {
        let d = desc("c", "e");
        assert!(!d.contains_key(&Key::from("b")));
        assert!(d.contains_key(&Key::from("c")));
        assert!(d.contains_key(&Key::from("d")));
        assert!(!d.contains_key(&Key::from("e")));
    }

    #[test]
    fn test_contains_key_inclusive_is_open_at_start() {
        let d = desc("c", "e");
        assert!(!d.contains_key_inclusive(&Key::from("c")));
        assert!(d.contains_key_inclusive(&Key::from("d")));
        assert!(d.contains_key_inclusive(&Key::from("e")));
        assert!(!d.contains_key_for_mode(&Key::from("e"), false));
        assert!(d.contains_key_for_mode(&Key::from("e"), true));
    }

    #[test]
    fn test_full_range_contains_everything_below_max() {
        let d = RangeDescriptor::new(RangeId::new(1), KEY_MIN, KEY_MAX);
        assert!(d.contains_key(&KEY_MIN));
        assert!(d.contains_key(&Key::from("zzzz")));
        assert!(!d.contains_key(&KEY_MAX));
    }

    #[test]
    fn test_overlaps() {
        assert!(desc("a", "c").overlaps(&desc("b", "d")));
        assert!(desc("b", "d").overlaps(&desc("a", "z")));
        assert!(!desc("a", "c").overlaps(&desc("c", "e")));
    }

    #[test]
    fn test_equality_includes_payload() {
        let a = desc("a", "b");
        let b = desc("a", "b").with_replicas(vec![ReplicaDescriptor::new(
            NodeId::from(1),
            StoreId::from(1),
            ReplicaId::from(1),
        )]);
        assert_ne!(a, b);
        assert_eq!(a, desc("a", "b"));
        assert_ne!(a, RangeDescriptor::default());
    }

    #[test]
    fn test_serde_uses_escaped_keys() {
        let d = RangeDescriptor::new(RangeId::new(7), KEY_MIN, Key::from("\x00b"));
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"end_key\":\"\\\\x00b\""));
        let back: RangeDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
