//! Identity and ordering types for the room sync protocol.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// The name of a replication channel ("room").
///
/// Rooms are identified by a unique string key; the name travels on the
/// wire length-prefixed and must be valid UTF-8.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Create a room name from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the room name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the name in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for RoomName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for RoomName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomName({:?})", self.0)
    }
}

/// A position on a room's shared sequence line.
///
/// The same number line carries local sequence numbers tagging unconfirmed
/// client updates (`clientConf`) and host log positions (`hostOffset`);
/// a host confirmation for offset N covers everything at or below N.
/// Offsets are assigned by counters, not clocks, so they never drift.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    /// Create a new Offset with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Offset.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The offset representing "nothing confirmed yet".
    pub fn zero() -> Self {
        Self(0)
    }

    /// Increment the offset by one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({})", self.0)
    }
}

/// One incarnation of a room on the host (`roomInstanceId`).
///
/// Assigned by the host when it (re)creates a room. A confirmation carrying
/// an epoch different from the stored one means the host rebuilt the room
/// and local host-derived history is stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RoomEpoch(u64);

impl RoomEpoch {
    /// Create a new RoomEpoch with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this RoomEpoch.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoomEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RoomEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomEpoch({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn room_name_display_is_raw() {
        let room = RoomName::from("doc1");
        assert_eq!(room.to_string(), "doc1");
        assert_eq!(room.as_str(), "doc1");
    }

    #[test]
    fn room_name_map_lookup_by_str() {
        let mut map: HashMap<RoomName, u32> = HashMap::new();
        map.insert(RoomName::from("doc1"), 7);
        assert_eq!(map.get("doc1"), Some(&7));
        assert_eq!(map.get("doc2"), None);
    }

    #[test]
    fn room_name_empty() {
        assert!(RoomName::from("").is_empty());
        assert!(!RoomName::from("a").is_empty());
    }

    #[test]
    fn offset_ordering() {
        let a = Offset::new(100);
        let b = Offset::new(200);
        assert!(a < b);
        assert!(b > a);
    }

    #[test]
    fn offset_next() {
        let o = Offset::new(100);
        assert_eq!(o.next().value(), 101);
    }

    #[test]
    fn offset_zero_is_default() {
        assert_eq!(Offset::zero(), Offset::default());
        assert_eq!(Offset::zero().value(), 0);
    }

    #[test]
    fn offset_saturates() {
        let o = Offset::new(u64::MAX);
        assert_eq!(o.next().value(), u64::MAX); // Saturates, doesn't wrap
    }

    #[test]
    fn epoch_equality() {
        assert_eq!(RoomEpoch::new(42), RoomEpoch::new(42));
        assert_ne!(RoomEpoch::new(42), RoomEpoch::new(43));
    }

    #[test]
    fn ids_serialize_transparently() {
        // Store records rely on these being plain strings/numbers.
        assert_eq!(
            serde_json::to_string(&RoomName::from("doc1")).unwrap(),
            "\"doc1\""
        );
        assert_eq!(serde_json::to_string(&Offset::new(42)).unwrap(), "42");
        let epoch: RoomEpoch = serde_json::from_str("7").unwrap();
        assert_eq!(epoch, RoomEpoch::new(7));
    }
}
