//! Interned strings.
//!
//! An [`Atom`] is an immutable string interned in a process-wide table.
//! Node identities are atoms so that [`crate::ProcessId`] stays `Copy`
//! and pid equality is a pair of integer compares.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// An interned string: a `u32` index into the global atom table.
///
/// Atoms are `Copy`, compare in O(1), and serialize as their string
/// value so they survive the wire between nodes with different intern
/// orders.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(u32);

struct AtomTable {
    by_value: DashMap<String, u32>,
    by_index: RwLock<Vec<String>>,
}

static TABLE: OnceLock<AtomTable> = OnceLock::new();

fn table() -> &'static AtomTable {
    TABLE.get_or_init(|| AtomTable {
        by_value: DashMap::new(),
        by_index: RwLock::new(Vec::new()),
    })
}

impl Atom {
    /// Interns `value`, returning the existing atom if it was seen before.
    pub fn new(value: &str) -> Self {
        let t = table();
        if let Some(index) = t.by_value.get(value) {
            return Atom(*index);
        }
        let mut values = t.by_index.write();
        // Another thread may have won the race between the lookup and
        // the write lock.
        if let Some(index) = t.by_value.get(value) {
            return Atom(*index);
        }
        let index = values.len() as u32;
        values.push(value.to_string());
        t.by_value.insert(value.to_string(), index);
        Atom(index)
    }

    /// Returns the string value of this atom.
    pub fn as_str(&self) -> String {
        table().by_index.read()[self.0 as usize].clone()
    }
}

impl From<&str> for Atom {
    fn from(value: &str) -> Self {
        Atom::new(value)
    }
}

impl From<String> for Atom {
    fn from(value: String) -> Self {
        Atom::new(&value)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Atom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for Atom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Atom::new(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = Atom::new("node1@localhost");
        let b = Atom::new("node1@localhost");
        let c = Atom::new("node2@localhost");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "node1@localhost");
    }

    #[test]
    fn serializes_as_string_value() {
        let a = Atom::new("127.0.0.1:9001");
        let bytes = postcard::to_allocvec(&a).unwrap();
        let back: Atom = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(a, back);
        assert_eq!(back.as_str(), "127.0.0.1:9001");
    }
}
