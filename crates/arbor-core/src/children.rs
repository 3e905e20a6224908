//! Children slots
//!
//! Every structural change goes through these operations. Attaching to a
//! mounted parent mounts the child's subtree; removing unmounts it before the
//! slot changes. Each completed mutation emits `childUpdateDone` with the new
//! children list and notifies children observers, even when a mount hook or
//! a check re-run triggered by the change fails.

use crate::connector::{Event, Payload, CHILD_UPDATE_DONE};
use crate::entity::SlotRef;
use crate::lifecycle::Refreshes;
use crate::{EntityKey, Error, Result, Status, World};
use tracing::debug;

impl World {
    /// Append a child to the parent's list slot
    pub fn append_child(&mut self, parent: EntityKey, child: EntityKey) -> Result<()> {
        let owner = self.entity(parent)?;
        if !owner.has_list() {
            return Err(Error::NoListSlot(owner.code().to_string()));
        }
        self.check_attachable(parent, child)?;
        let index = owner.list().len();
        let mounted = self.place(parent, SlotRef::List(index), child)?;
        debug!(parent = %parent, child = %child, "child appended");
        let hooked = self.run_mount_hooks(&mounted);
        self.children_changed(parent)?;
        hooked
    }

    /// Put a child into a dict slot, returning the child it replaced
    ///
    /// The replaced child is unmounted and detached first. If the new child
    /// cannot be mounted, the old one is put back with its edges and
    /// observers.
    pub fn set_child(
        &mut self,
        parent: EntityKey,
        slot: &str,
        child: EntityKey,
    ) -> Result<Option<EntityKey>> {
        let previous = self.occupant(parent, slot)?;
        self.check_attachable(parent, child)?;
        let slot_ref = SlotRef::Dict(slot.to_string());

        let (refreshes, kept) = match previous {
            Some(previous) => {
                let mounted = self.entity(previous)?.is_mounted();
                (self.release(parent, previous, true)?, mounted)
            }
            None => (Vec::new(), false),
        };
        let mounted = match self.place(parent, slot_ref.clone(), child) {
            Ok(mounted) => mounted,
            Err(err) => {
                if let Some(previous) = previous {
                    let restored = self.place(parent, slot_ref, previous)?;
                    self.run_mount_hooks(&restored)?;
                }
                return Err(err);
            }
        };
        if let (Some(previous), true) = (previous, kept) {
            self.forget_refs(previous)?;
        }
        debug!(parent = %parent, slot, child = %child, "child set");

        let refreshed = self.run_refreshes(refreshes);
        let hooked = self.run_mount_hooks(&mounted);
        self.children_changed(parent)?;
        refreshed?;
        hooked?;
        Ok(previous)
    }

    /// Detach a child from whichever slot holds it
    pub fn remove_child(&mut self, parent: EntityKey, child: EntityKey) -> Result<()> {
        let owner = self.entity(parent)?;
        if owner.slot_of(child).is_none() {
            return Err(Error::NotAChild {
                parent: owner.id().clone(),
                child: self.entity(child)?.id().clone(),
            });
        }
        let refreshes = self.release(parent, child, false)?;
        debug!(parent = %parent, child = %child, "child removed");
        let refreshed = self.run_refreshes(refreshes);
        self.children_changed(parent)?;
        refreshed
    }

    /// Empty a dict slot, returning the detached child
    pub fn take_child(&mut self, parent: EntityKey, slot: &str) -> Result<Option<EntityKey>> {
        let Some(child) = self.occupant(parent, slot)? else {
            return Ok(None);
        };
        let refreshes = self.release(parent, child, false)?;
        debug!(parent = %parent, slot, child = %child, "child taken");
        let refreshed = self.run_refreshes(refreshes);
        self.children_changed(parent)?;
        refreshed.map(|()| Some(child))
    }

    /// Drop a detached subtree from the arena
    ///
    /// Only entities that are not held by a parent and not mounted can be
    /// destroyed; their keys become invalid.
    pub fn destroy(&mut self, key: EntityKey) -> Result<()> {
        self.entity(key)?
            .expect_status(&[Status::Created, Status::Unbound])?;
        let subtree = self.subtree(key)?;
        for node in &subtree {
            self.entities.shift_remove(node);
        }
        debug!(key = %key, count = subtree.len(), "destroyed");
        Ok(())
    }

    fn occupant(&self, parent: EntityKey, slot: &str) -> Result<Option<EntityKey>> {
        let owner = self.entity(parent)?;
        match owner.dict.get(slot) {
            Some(occupant) => Ok(*occupant),
            None => Err(Error::UnknownSlot {
                code: owner.code().to_string(),
                slot: slot.to_string(),
            }),
        }
    }

    fn check_attachable(&self, parent: EntityKey, child: EntityKey) -> Result<()> {
        let owner = self.entity(parent)?;
        owner.expect_status(&[
            Status::Created,
            Status::Bound,
            Status::Mounted,
            Status::Unbound,
        ])?;
        let entity = self.entity(child)?;
        if let Some(current) = entity.parent() {
            return Err(Error::AlreadyAttached {
                child: entity.id().clone(),
                parent: current,
            });
        }

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(Error::OwnershipCycle {
                    child: entity.id().clone(),
                    parent: owner.id().clone(),
                });
            }
            cursor = self.entity(ancestor)?.parent();
        }

        entity.expect_status(&[Status::Created, Status::Unbound])
    }

    /// Put a child into a slot and mount it if the parent is mounted
    ///
    /// Returns the newly mounted keys in pre-order; the caller runs their
    /// mount hooks. Undoes the placement if mounting fails.
    pub(crate) fn place(
        &mut self,
        parent: EntityKey,
        slot: SlotRef,
        child: EntityKey,
    ) -> Result<Vec<EntityKey>> {
        let prior = self.entity(child)?.status();
        self.attach(parent, &slot, child)?;
        if !self.entity(parent)?.is_mounted() {
            return Ok(Vec::new());
        }
        match self.mount(child) {
            Ok(mounted) => Ok(mounted),
            Err(err) => {
                self.unplace(parent, child)?;
                self.entity_mut(child)?.status = prior;
                Err(err)
            }
        }
    }

    /// Record parent and slot, without mounting
    pub(crate) fn attach(
        &mut self,
        parent: EntityKey,
        slot: &SlotRef,
        child: EntityKey,
    ) -> Result<()> {
        let owner = self.entity_mut(parent)?;
        match slot {
            SlotRef::List(index) => match owner.list.as_mut() {
                Some(list) => {
                    let at = (*index).min(list.len());
                    list.insert(at, child);
                }
                None => return Err(Error::NoListSlot(owner.code.clone())),
            },
            SlotRef::Dict(name) => match owner.dict.get_mut(name) {
                Some(occupant) => *occupant = Some(child),
                None => {
                    return Err(Error::UnknownSlot {
                        code: owner.code.clone(),
                        slot: name.clone(),
                    })
                }
            },
        }
        let entity = self.entity_mut(child)?;
        entity.parent = Some(parent);
        entity.status = Status::Bound;
        Ok(())
    }

    /// Unmount a child if needed and clear it from its slot
    ///
    /// Entities halfway through mounting or unmounting are refused.
    fn release(
        &mut self,
        parent: EntityKey,
        child: EntityKey,
        keep_refs: bool,
    ) -> Result<Refreshes> {
        let entity = self.entity(child)?;
        entity.expect_status(&[Status::Bound, Status::Mounted])?;
        let refreshes = if entity.is_mounted() {
            self.unmount(child, keep_refs)?
        } else {
            Vec::new()
        };
        self.unplace(parent, child)?;
        self.entity_mut(child)?.status = Status::Unbound;
        Ok(refreshes)
    }

    fn unplace(&mut self, parent: EntityKey, child: EntityKey) -> Result<()> {
        let owner = self.entity_mut(parent)?;
        match owner.slot_of(child) {
            Some(SlotRef::List(index)) => {
                if let Some(list) = owner.list.as_mut() {
                    list.remove(index);
                }
            }
            Some(SlotRef::Dict(name)) => {
                owner.dict.insert(name, None);
            }
            None => {}
        }
        self.entity_mut(child)?.parent = None;
        Ok(())
    }

    fn children_changed(&mut self, parent: EntityKey) -> Result<()> {
        let children = self.entity(parent)?.children();
        let mut event = Event::new(
            parent,
            CHILD_UPDATE_DONE,
            Payload::Children(children.clone()),
        );
        self.dispatch(&mut event)?;
        self.notify_children(parent, &children)
    }
}
