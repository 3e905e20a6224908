//! Inspector subscriptions
//!
//! Observers are plain callbacks that see a snapshot and cannot reach the
//! world, so they never feed back into the event graph. They are only
//! accepted on mounted entities and are dropped when the entity unmounts.

use crate::entity::Entity;
use crate::{EntityKey, Result, ValueMap, World};

/// Token returned by the `add_*_observer` calls, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Receives the full actual state after every commit
pub type StateObserver = Box<dyn FnMut(&ValueMap)>;

/// Receives the full children list after every slot mutation
pub type ChildrenObserver = Box<dyn FnMut(&[EntityKey])>;

impl World {
    pub fn add_state_observer(
        &mut self,
        key: EntityKey,
        observer: impl FnMut(&ValueMap) + 'static,
    ) -> Result<ObserverId> {
        self.entity(key)?.expect_mounted()?;
        let id = self.next_observer_id();
        self.entity_mut(key)?
            .state_observers
            .insert(id, Box::new(observer));
        Ok(id)
    }

    /// Returns `false` if the observer was already gone
    pub fn remove_state_observer(&mut self, key: EntityKey, id: ObserverId) -> Result<bool> {
        self.entity(key)?.expect_mounted()?;
        Ok(self
            .entity_mut(key)?
            .state_observers
            .shift_remove(&id)
            .is_some())
    }

    pub fn add_children_observer(
        &mut self,
        key: EntityKey,
        observer: impl FnMut(&[EntityKey]) + 'static,
    ) -> Result<ObserverId> {
        self.entity(key)?.expect_mounted()?;
        let id = self.next_observer_id();
        self.entity_mut(key)?
            .children_observers
            .insert(id, Box::new(observer));
        Ok(id)
    }

    pub fn remove_children_observer(&mut self, key: EntityKey, id: ObserverId) -> Result<bool> {
        self.entity(key)?.expect_mounted()?;
        Ok(self
            .entity_mut(key)?
            .children_observers
            .shift_remove(&id)
            .is_some())
    }

    pub(crate) fn notify_state(&mut self, key: EntityKey) -> Result<()> {
        let Entity {
            actual,
            state_observers,
            ..
        } = self.entity_mut(key)?;
        for observer in state_observers.values_mut() {
            observer(actual);
        }
        Ok(())
    }

    pub(crate) fn notify_children(&mut self, key: EntityKey, children: &[EntityKey]) -> Result<()> {
        for observer in self.entity_mut(key)?.children_observers.values_mut() {
            observer(children);
        }
        Ok(())
    }

    fn next_observer_id(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        id
    }
}
