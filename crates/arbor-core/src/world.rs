//! The world: entity arena, identity registry and factory for one tree
//!
//! Every entity lives in exactly one world and is addressed by its
//! [`EntityKey`]. All mutation (state, slots, edges, lifecycle) goes through
//! `&mut World`, which is what keeps the cyclic event graph free of shared
//! mutable references. Several worlds can coexist without interfering.

use crate::identity::IdAllocator;
use crate::{
    Entity, EntityId, EntityKey, Error, Factory, Registry, Result, Value, ValueMap, WorldConfig,
};
use indexmap::IndexMap;
use std::fmt::Write as _;

/// Runtime container for one entity tree
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) factory: Factory,
    pub(crate) registry: Registry,
    pub(crate) entities: IndexMap<EntityKey, Entity>,
    pub(crate) root: Option<EntityKey>,
    /// Current nesting of event delivery
    pub(crate) depth: usize,
    pub(crate) next_observer: u64,
    next_key: u64,
    ids: IdAllocator,
}

impl World {
    /// Create a world with the default configuration
    pub fn new(factory: Factory) -> Self {
        Self::with_config(factory, WorldConfig::default())
    }

    /// Create a world with a specific configuration
    pub fn with_config(factory: Factory, config: WorldConfig) -> Self {
        let prefix = match config.id_prefix() {
            Some(prefix) => prefix.to_string(),
            None => IdAllocator::timestamp_prefix(),
        };
        Self {
            config,
            factory,
            registry: Registry::new(),
            entities: IndexMap::new(),
            root: None,
            depth: 0,
            next_observer: 0,
            next_key: 0,
            ids: IdAllocator::new(prefix),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Registry of mounted entities
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The mounted root, if any
    pub fn root(&self) -> Option<EntityKey> {
        self.root
    }

    /// Get an entity by key
    pub fn entity(&self, key: EntityKey) -> Result<&Entity> {
        self.entities.get(&key).ok_or(Error::EntityNotFound(key))
    }

    pub(crate) fn entity_mut(&mut self, key: EntityKey) -> Result<&mut Entity> {
        self.entities.get_mut(&key).ok_or(Error::EntityNotFound(key))
    }

    /// Check if a key refers to a live entity (mounted or not)
    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(&key)
    }

    /// Number of entities in the arena, mounted or not
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up a mounted entity by id
    pub fn lookup(&self, id: &EntityId) -> Option<EntityKey> {
        self.registry.lookup(id)
    }

    /// Resolve an id on behalf of a mounted entity
    ///
    /// Fails if `from` is not mounted or if nothing is registered under `id`.
    pub fn resolve(&self, from: EntityKey, id: &EntityId) -> Result<EntityKey> {
        self.entity(from)?.expect_mounted()?;
        self.registry
            .lookup(id)
            .ok_or_else(|| Error::IdNotRegistered(id.clone()))
    }

    /// Actual state of an entity
    pub fn state(&self, key: EntityKey) -> Result<&ValueMap> {
        Ok(self.entity(key)?.state())
    }

    /// One actual state value, `Null` when unset
    pub fn get(&self, key: EntityKey, field: &str) -> Result<Value> {
        Ok(self.entity(key)?.get(field).cloned().unwrap_or_default())
    }

    /// Keys of an entity's subtree in pre-order, list slot before dict slots
    pub fn subtree(&self, key: EntityKey) -> Result<Vec<EntityKey>> {
        let mut order = Vec::new();
        self.collect_subtree(key, &mut order)?;
        Ok(order)
    }

    fn collect_subtree(&self, key: EntityKey, order: &mut Vec<EntityKey>) -> Result<()> {
        order.push(key);
        for child in self.entity(key)?.children() {
            self.collect_subtree(child, order)?;
        }
        Ok(())
    }

    /// Render a subtree as an indented listing, for inspectors and logs
    pub fn describe(&self, key: EntityKey) -> Result<String> {
        let mut out = String::new();
        self.describe_into(key, 0, &mut out)?;
        Ok(out)
    }

    fn describe_into(&self, key: EntityKey, indent: usize, out: &mut String) -> Result<()> {
        let entity = self.entity(key)?;
        let state = entity
            .state()
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{:indent$}{} [{}] {:?} {{{}}}",
            "",
            entity.code(),
            entity.id(),
            entity.status(),
            state,
            indent = indent * 2
        );
        for child in entity.children() {
            self.describe_into(child, indent + 1, out)?;
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, entity: Entity) -> EntityKey {
        let key = EntityKey(self.next_key);
        self.next_key += 1;
        self.entities.insert(key, entity);
        key
    }

    /// Fresh id, unused by any mounted or detached entity
    pub(crate) fn allocate_id(&mut self) -> EntityId {
        let (registry, entities) = (&self.registry, &self.entities);
        self.ids
            .next(|id| registry.contains(id) || entities.values().any(|e| e.id == *id))
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("factory", &self.factory)
            .field("root", &self.root)
            .field("entities", &self.entities.len())
            .field("mounted", &self.registry.len())
            .finish()
    }
}
