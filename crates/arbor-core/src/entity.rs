//! Entity: a node of the ownership tree
//!
//! Entities live in the [`World`](crate::World) arena and are only ever
//! mutated through it. The accessors here are the read-only view game code and
//! inspectors get.

use crate::connector::{is_builtin_emitter, Connector, EdgeRef, Endpoint, HandlerSlot};
use crate::observer::{ChildrenObserver, ObserverId, StateObserver};
use crate::{EntityId, EntityKey, Error, Result, Status, Value, ValueMap, World};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Lifecycle callback, run with the world and the entity's own key
pub type Hook = Rc<dyn Fn(&mut World, EntityKey) -> Result<()>>;

/// Ordered lifecycle callbacks declared by an entity type
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) mount: Vec<Hook>,
    pub(crate) unmount: Vec<Hook>,
}

/// Which side of an edge a stored reference sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Emitter,
    Handler,
}

/// A connector reference loaded from a bundle, waiting for mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingEdge {
    pub(crate) side: Side,
    pub(crate) channel: String,
    pub(crate) remote: EdgeRef,
}

/// Where a child sits inside its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlotRef {
    List(usize),
    Dict(String),
}

/// A dynamic entity instance
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) code: String,
    pub(crate) parent: Option<EntityKey>,
    pub(crate) status: Status,
    /// Values as last proposed
    pub(crate) origin: ValueMap,
    /// Values after the check pipeline; the externally observable state
    pub(crate) actual: ValueMap,
    /// `None` when the type declares no list slot
    pub(crate) list: Option<Vec<EntityKey>>,
    /// Declared dict slots, in declaration order
    pub(crate) dict: IndexMap<String, Option<EntityKey>>,
    pub(crate) declared_emitters: Vec<String>,
    /// Created lazily on first bind
    pub(crate) emitters: IndexMap<String, Connector>,
    pub(crate) handlers: IndexMap<String, HandlerSlot>,
    pub(crate) hooks: Hooks,
    pub(crate) pending: Vec<PendingEdge>,
    /// Keys whose check phase is running
    pub(crate) checking: HashSet<String>,
    pub(crate) state_observers: IndexMap<ObserverId, StateObserver>,
    pub(crate) children_observers: IndexMap<ObserverId, ChildrenObserver>,
}

impl Entity {
    pub(crate) fn new(id: EntityId, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            parent: None,
            status: Status::Created,
            origin: ValueMap::new(),
            actual: ValueMap::new(),
            list: None,
            dict: IndexMap::new(),
            declared_emitters: Vec::new(),
            emitters: IndexMap::new(),
            handlers: IndexMap::new(),
            hooks: Hooks::default(),
            pending: Vec::new(),
            checking: HashSet::new(),
            state_observers: IndexMap::new(),
            children_observers: IndexMap::new(),
        }
    }

    /// Stable id
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Type tag
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Owning entity, `None` for a root or a detached entity
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_mounted(&self) -> bool {
        self.status == Status::Mounted
    }

    /// Actual (post-pipeline) state
    pub fn state(&self) -> &ValueMap {
        &self.actual
    }

    /// Origin state, as last proposed
    pub fn origin(&self) -> &ValueMap {
        &self.origin
    }

    /// Get an actual state value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.actual.get(key)
    }

    /// Get an actual state value as an integer
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.actual.get(key).and_then(Value::as_int)
    }

    /// Check if the type declares a list slot
    pub fn has_list(&self) -> bool {
        self.list.is_some()
    }

    /// Children in the list slot
    pub fn list(&self) -> &[EntityKey] {
        self.list.as_deref().unwrap_or(&[])
    }

    /// Child in a dict slot
    pub fn slot(&self, name: &str) -> Option<EntityKey> {
        self.dict.get(name).copied().flatten()
    }

    /// Declared dict slots with their occupants, in declaration order
    pub fn slots(&self) -> impl Iterator<Item = (&str, Option<EntityKey>)> {
        self.dict.iter().map(|(name, child)| (name.as_str(), *child))
    }

    /// All children: list slot first, then dict slots in declaration order
    pub fn children(&self) -> Vec<EntityKey> {
        self.list()
            .iter()
            .copied()
            .chain(self.dict.values().filter_map(|child| *child))
            .collect()
    }

    /// Emitter channels declared by the type
    pub fn emitter_channels(&self) -> &[String] {
        &self.declared_emitters
    }

    /// Handler channels declared by the type
    pub fn handler_channels(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Handlers bound to one of this entity's emitters, in bind order
    pub fn bound_handlers(&self, channel: &str) -> &[Endpoint] {
        self.emitters
            .get(channel)
            .map(Connector::endpoints)
            .unwrap_or(&[])
    }

    /// Emitters bound to one of this entity's handlers, in bind order
    pub fn bound_emitters(&self, channel: &str) -> &[Endpoint] {
        self.handlers
            .get(channel)
            .map(|slot| slot.connector.endpoints())
            .unwrap_or(&[])
    }

    pub(crate) fn accepts_emitter(&self, channel: &str) -> bool {
        is_builtin_emitter(channel) || self.declared_emitters.iter().any(|c| c == channel)
    }

    pub(crate) fn expect_status(&self, expected: &[Status]) -> Result<()> {
        if expected.contains(&self.status) {
            Ok(())
        } else {
            Err(Error::InvalidStatus {
                id: self.id.clone(),
                expected: expected.to_vec(),
                actual: self.status,
            })
        }
    }

    pub(crate) fn expect_mounted(&self) -> Result<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(Error::NotMounted(self.id.clone()))
        }
    }

    pub(crate) fn slot_of(&self, child: EntityKey) -> Option<SlotRef> {
        if let Some(index) = self.list().iter().position(|k| *k == child) {
            return Some(SlotRef::List(index));
        }
        self.dict
            .iter()
            .find(|(_, occupant)| **occupant == Some(child))
            .map(|(name, _)| SlotRef::Dict(name.clone()))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("parent", &self.parent)
            .field("status", &self.status)
            .field("state", &self.actual)
            .field("list", &self.list)
            .field("dict", &self.dict)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> Entity {
        let mut entity = Entity::new(EntityId::new("r"), "root");
        entity.list = Some(vec![EntityKey(2), EntityKey(3)]);
        entity.dict.insert("timer".into(), Some(EntityKey(1)));
        entity.dict.insert("spare".into(), None);
        entity.declared_emitters.push("spawnDone".into());
        entity
    }

    #[test]
    fn test_children_list_before_dict() {
        let entity = entity();
        assert_eq!(
            entity.children(),
            vec![EntityKey(2), EntityKey(3), EntityKey(1)]
        );
        assert_eq!(entity.slot("timer"), Some(EntityKey(1)));
        assert_eq!(entity.slot("spare"), None);
        assert_eq!(entity.slots().count(), 2);
    }

    #[test]
    fn test_slot_of() {
        let entity = entity();
        assert_eq!(entity.slot_of(EntityKey(3)), Some(SlotRef::List(1)));
        assert_eq!(
            entity.slot_of(EntityKey(1)),
            Some(SlotRef::Dict("timer".into()))
        );
        assert_eq!(entity.slot_of(EntityKey(9)), None);
    }

    #[test]
    fn test_accepts_emitter() {
        let entity = entity();
        assert!(entity.accepts_emitter("spawnDone"));
        assert!(entity.accepts_emitter("progressUpdateDone"));
        assert!(entity.accepts_emitter("childUpdateDone"));
        assert!(!entity.accepts_emitter("tickDone"));
    }

    #[test]
    fn test_expect_status() {
        let entity = entity();
        assert!(entity.expect_status(&[Status::Created]).is_ok());
        assert!(matches!(
            entity.expect_status(&[Status::Mounted]),
            Err(Error::InvalidStatus { actual: Status::Created, .. })
        ));
        assert_eq!(
            entity.expect_mounted(),
            Err(Error::NotMounted(EntityId::new("r")))
        );
    }
}
