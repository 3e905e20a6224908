//! State pipeline: propose, check, commit, notify
//!
//! `set_state` writes the origin value, then runs the pipeline:
//!
//! 1. `prev` is the current actual value (`Null` when unset)
//! 2. `"<key>UpdateBefore"` is emitted; bound handlers may overwrite `next`
//! 3. if `next == prev` nothing is committed and nobody is notified
//! 4. otherwise the actual value is committed and `"<key>UpdateDone"` emitted
//! 5. state observers receive the full actual state
//!
//! While the check phase for a key runs, another update of the same key on
//! the same entity is rejected with [`Error::ReentrantUpdate`]. Updates issued
//! from `UpdateDone` handlers are fine and run depth-first.

use crate::connector::{update_before, update_done, Event, Payload, StateUpdate};
use crate::{EntityKey, Error, Result, Value, World};
use tracing::{trace, warn};

impl World {
    /// Propose a new value for a state key
    ///
    /// Returns `true` if the actual value changed.
    pub fn set_state(
        &mut self,
        key: EntityKey,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<bool> {
        let value = value.into();
        self.guard_reentry(key, field)?;
        self.entity_mut(key)?
            .origin
            .insert(field.to_string(), value.clone());
        self.run_pipeline(key, field, value)
    }

    /// Propose a value computed from the current origin value
    pub fn modify_state(
        &mut self,
        key: EntityKey,
        field: &str,
        f: impl FnOnce(&Value) -> Value,
    ) -> Result<bool> {
        let current = self
            .entity(key)?
            .origin
            .get(field)
            .cloned()
            .unwrap_or_default();
        self.set_state(key, field, f(&current))
    }

    /// Re-run the pipeline for a key from its origin value
    ///
    /// Used when the set of check handlers changes.
    pub fn refresh_state(&mut self, key: EntityKey, field: &str) -> Result<bool> {
        self.guard_reentry(key, field)?;
        let origin = self
            .entity(key)?
            .origin
            .get(field)
            .cloned()
            .unwrap_or_default();
        self.run_pipeline(key, field, origin)
    }

    fn guard_reentry(&self, key: EntityKey, field: &str) -> Result<()> {
        let entity = self.entity(key)?;
        if entity.checking.contains(field) {
            warn!(id = %entity.id(), field, "update rejected during its own check phase");
            return Err(Error::ReentrantUpdate {
                id: entity.id().clone(),
                key: field.to_string(),
            });
        }
        Ok(())
    }

    fn run_pipeline(&mut self, key: EntityKey, field: &str, proposed: Value) -> Result<bool> {
        let entity = self.entity_mut(key)?;
        entity.checking.insert(field.to_string());
        let prev = entity.actual.get(field).cloned().unwrap_or_default();

        let mut check = Event::new(
            key,
            update_before(field),
            Payload::Update(StateUpdate::new(field, prev.clone(), proposed)),
        );
        let checked = self.dispatch(&mut check);
        if let Ok(entity) = self.entity_mut(key) {
            entity.checking.remove(field);
        }
        checked?;

        let next = match check.into_update() {
            Some(update) if update.next != prev => update.next,
            _ => return Ok(false),
        };

        let entity = self.entity_mut(key)?;
        entity.actual.insert(field.to_string(), next.clone());
        trace!(id = %entity.id, field, %prev, %next, "state committed");

        let mut done = Event::new(
            key,
            update_done(field),
            Payload::Update(StateUpdate::new(field, prev, next)),
        );
        self.dispatch(&mut done)?;
        self.notify_state(key)?;
        Ok(true)
    }
}
