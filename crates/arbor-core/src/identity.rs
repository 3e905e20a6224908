//! Identity types for entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an entity
///
/// Survives serialization: a bundle carries the ids of its entities so that
/// connector references between them can be resolved again after loading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Create a new entity ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Handle to an entity inside a [`World`](crate::World) arena
///
/// Keys are never reused within a world and are never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub(crate) u64);

impl EntityKey {
    /// Get the raw key value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Generates fresh entity ids as `prefix + base36(counter)`
#[derive(Debug, Clone)]
pub(crate) struct IdAllocator {
    prefix: String,
    next: u64,
}

impl IdAllocator {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    /// Prefix derived from the current wall clock, in milliseconds
    pub(crate) fn timestamp_prefix() -> String {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        to_base36(millis)
    }

    /// Allocate the next id for which `taken` returns false
    pub(crate) fn next(&mut self, taken: impl Fn(&EntityId) -> bool) -> EntityId {
        loop {
            let id = EntityId(format!("{}{}", self.prefix, to_base36(self.next)));
            self.next += 1;
            if !taken(&id) {
                return id;
            }
        }
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
