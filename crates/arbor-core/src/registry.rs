//! Identity registry: stable id -> live entity
//!
//! Holds exactly the entities that are currently mounted. It is the only way
//! to turn an [`EntityId`] found in a bundle (or passed around by game code)
//! back into a live [`EntityKey`].

use crate::{EntityId, EntityKey, Error, Result};
use indexmap::IndexMap;

/// Registry of mounted entities, in mount order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<EntityId, EntityKey>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mounted entity
    ///
    /// Duplicate ids are never overwritten.
    pub fn register(&mut self, id: EntityId, key: EntityKey) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.entries.insert(id, key);
        Ok(())
    }

    /// Remove an entity, returning the key it was registered under
    pub fn deregister(&mut self, id: &EntityId) -> Result<EntityKey> {
        self.entries
            .shift_remove(id)
            .ok_or_else(|| Error::IdNotRegistered(id.clone()))
    }

    /// Look up a live entity by id
    pub fn lookup(&self, id: &EntityId) -> Option<EntityKey> {
        self.entries.get(id).copied()
    }

    /// Check if an id is registered
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    /// Get all registered ids in mount order
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    /// Get the number of registered entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
