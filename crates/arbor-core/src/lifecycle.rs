//! Lifecycle: mounting and unmounting subtrees
//!
//! Mounting registers a subtree depth-first (list slot before dict slots),
//! turns stored edge references into live bindings, and only then runs the
//! mount hooks. A failure before the hooks rolls the subtree back; a failing
//! hook leaves it mounted.
//!
//! Unmounting runs the unmount hooks first, then tears the subtree down in
//! reverse order. Teardown itself cannot fail halfway: emitters outside the
//! subtree that lose a check handler are re-run only once it has finished.

use crate::connector::checked_key;
use crate::entity::{PendingEdge, Side};
use crate::{EdgeRef, EntityKey, Error, Result, World};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Lifecycle status of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Just constructed, no parent
    Created,
    /// Held in a parent slot, not mounted
    Bound,
    Mounting,
    Mounted,
    Unmounting,
    /// Detached after having been mounted or bound
    Unbound,
}

/// A bound edge, named by both endpoints
struct Edge {
    emitter: EntityKey,
    emitter_channel: String,
    handler: EntityKey,
    handler_channel: String,
}

/// `(emitter, key)` pairs whose checks changed during a teardown
pub(crate) type Refreshes = Vec<(EntityKey, String)>;

impl World {
    /// Designate `key` as the root and mount its subtree
    ///
    /// If a mount hook fails the tree stays mounted as the root, and the
    /// error is returned.
    pub fn mount_root(&mut self, key: EntityKey) -> Result<()> {
        if self.root.is_some() {
            return Err(Error::RootAlreadyMounted);
        }
        self.entity(key)?
            .expect_status(&[Status::Created, Status::Unbound])?;
        self.root = Some(key);
        let order = match self.mount(key) {
            Ok(order) => order,
            Err(err) => {
                self.root = None;
                return Err(err);
            }
        };
        self.run_mount_hooks(&order)
    }

    /// Unmount the root subtree, returning the former root
    ///
    /// The entities stay in the arena and can be serialized or mounted again.
    pub fn unmount_root(&mut self) -> Result<EntityKey> {
        let root = self.root.ok_or(Error::NoRoot)?;
        let refreshes = self.unmount(root, false)?;
        self.root = None;
        self.run_refreshes(refreshes)?;
        Ok(root)
    }

    /// Register a subtree and bind its stored edges, without running hooks
    ///
    /// Returns the subtree in pre-order. On failure the subtree is returned
    /// to its unmounted state, keeping the edge references it had.
    pub(crate) fn mount(&mut self, key: EntityKey) -> Result<Vec<EntityKey>> {
        let prior = self.entity(key)?.status();
        let mut order = Vec::new();
        let mounted = self
            .mount_node(key, &mut order)
            .and_then(|()| self.check_resolved(&order));
        if let Err(err) = mounted {
            self.rollback_mount(key, prior, &order)?;
            return Err(err);
        }
        Ok(order)
    }

    /// Run the mount hooks of a freshly mounted subtree, in pre-order
    pub(crate) fn run_mount_hooks(&mut self, order: &[EntityKey]) -> Result<()> {
        for &key in order {
            let hooks = match self.entities.get(&key) {
                Some(entity) if entity.is_mounted() => entity.hooks.mount.clone(),
                _ => continue,
            };
            for hook in hooks {
                if let Err(err) = hook(self, key) {
                    warn!(key = %key, error = %err, "mount hook failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn mount_node(&mut self, key: EntityKey, order: &mut Vec<EntityKey>) -> Result<()> {
        let id = self.entity(key)?.id().clone();
        self.registry.register(id.clone(), key)?;
        self.entity_mut(key)?.status = Status::Mounting;
        order.push(key);

        for child in self.entity(key)?.children() {
            self.mount_node(child, order)?;
        }
        self.resolve_edges(key)?;

        let entity = self.entity_mut(key)?;
        entity.status = Status::Mounted;
        debug!(id = %id, code = %entity.code, "mounted");
        Ok(())
    }

    /// Bind every stored reference whose remote end is registered
    fn resolve_edges(&mut self, key: EntityKey) -> Result<()> {
        let own_id = self.entity(key)?.id().clone();
        let mut pending = std::mem::take(&mut self.entity_mut(key)?.pending).into_iter();
        let mut kept = Vec::new();

        while let Some(edge) = pending.next() {
            let Some(remote) = self.registry.lookup(&edge.remote.0) else {
                kept.push(edge);
                continue;
            };
            let bound = match edge.side {
                Side::Emitter => Edge {
                    emitter: key,
                    emitter_channel: edge.channel.clone(),
                    handler: remote,
                    handler_channel: edge.remote.1.clone(),
                },
                Side::Handler => Edge {
                    emitter: remote,
                    emitter_channel: edge.remote.1.clone(),
                    handler: key,
                    handler_channel: edge.channel.clone(),
                },
            };
            if !self.is_bound(
                bound.emitter,
                &bound.emitter_channel,
                bound.handler,
                &bound.handler_channel,
            ) {
                if let Err(err) = self.link(
                    bound.emitter,
                    &bound.emitter_channel,
                    bound.handler,
                    &bound.handler_channel,
                ) {
                    kept.push(edge);
                    kept.extend(pending);
                    self.entity_mut(key)?.pending = kept;
                    return Err(err);
                }
            }

            let mirror = PendingEdge {
                side: match edge.side {
                    Side::Emitter => Side::Handler,
                    Side::Handler => Side::Emitter,
                },
                channel: edge.remote.1,
                remote: EdgeRef(own_id.clone(), edge.channel),
            };
            self.entity_mut(remote)?.pending.retain(|p| *p != mirror);
        }

        self.entity_mut(key)?.pending = kept;
        Ok(())
    }

    fn check_resolved(&self, order: &[EntityKey]) -> Result<()> {
        for key in order {
            let entity = self.entity(*key)?;
            if let Some(edge) = entity.pending.first() {
                warn!(
                    id = %entity.id(),
                    channel = %edge.channel,
                    remote = %edge.remote.0,
                    "edge reference left unresolved after mount"
                );
                return Err(Error::UnresolvedEdge {
                    id: entity.id().clone(),
                    channel: edge.channel.clone(),
                    remote: edge.remote.0.clone(),
                    remote_channel: edge.remote.1.clone(),
                });
            }
        }
        Ok(())
    }

    fn rollback_mount(
        &mut self,
        top: EntityKey,
        prior: Status,
        order: &[EntityKey],
    ) -> Result<()> {
        let members: HashSet<EntityKey> = order.iter().copied().collect();
        // Edges bound during this mount never triggered a re-run.
        let mut unused = Vec::new();
        for key in order.iter().rev() {
            self.sever_edges(*key, Some(&members), &mut unused)?;
        }
        for key in order.iter().rev() {
            let entity = self.entity_mut(*key)?;
            entity.status = if *key == top { prior } else { Status::Bound };
            let id = entity.id.clone();
            self.registry.deregister(&id)?;
        }
        Ok(())
    }

    /// Unmount a mounted subtree
    ///
    /// Unmount hooks run first, while everything is still mounted; if one
    /// fails nothing is torn down. The top ends `Unbound` if it has no
    /// parent; everything else ends `Bound`, still held by its parent.
    ///
    /// With `keep_refs`, edges are turned back into stored references on the
    /// subtree's side and observers are kept, so the subtree can be mounted
    /// again unchanged. The returned emitters lost a check handler and must
    /// be re-run with [`World::run_refreshes`] once the caller is done.
    pub(crate) fn unmount(&mut self, key: EntityKey, keep_refs: bool) -> Result<Refreshes> {
        self.entity(key)?.expect_mounted()?;

        let subtree = self.subtree(key)?;
        for &node in subtree.iter().rev() {
            let hooks = match self.entities.get(&node) {
                Some(entity) if entity.is_mounted() => entity.hooks.unmount.clone(),
                _ => continue,
            };
            for hook in hooks {
                hook(self, node)?;
            }
        }
        // A hook may have detached the subtree itself.
        self.entity(key)?.expect_mounted()?;

        let subtree = self.subtree(key)?;
        for &node in &subtree {
            let entity = self.entity_mut(node)?;
            if entity.is_mounted() {
                entity.status = Status::Unmounting;
            }
        }
        let members: Option<HashSet<EntityKey>> =
            keep_refs.then(|| subtree.iter().copied().collect());
        let mut refreshes = Vec::new();
        self.unmount_node(key, members.as_ref(), &mut refreshes)?;
        Ok(refreshes)
    }

    fn unmount_node(
        &mut self,
        key: EntityKey,
        members: Option<&HashSet<EntityKey>>,
        refreshes: &mut Refreshes,
    ) -> Result<()> {
        self.sever_edges(key, members, refreshes)?;
        for child in self.entity(key)?.children().into_iter().rev() {
            self.unmount_node(child, members, refreshes)?;
        }

        let entity = self.entity_mut(key)?;
        if members.is_none() {
            entity.state_observers.clear();
            entity.children_observers.clear();
        }
        entity.checking.clear();
        entity.status = if entity.parent.is_some() {
            Status::Bound
        } else {
            Status::Unbound
        };
        let id = entity.id.clone();
        let code = entity.code.clone();
        self.registry.deregister(&id)?;
        debug!(id = %id, code = %code, "unmounted");
        Ok(())
    }

    /// Re-run the checks of emitters that lost a check handler
    ///
    /// Every pipeline runs even if an earlier one fails; the first error is
    /// returned.
    pub(crate) fn run_refreshes(&mut self, refreshes: Refreshes) -> Result<()> {
        let mut first = None;
        for (emitter, field) in refreshes {
            if !self.entities.get(&emitter).is_some_and(|e| e.is_mounted()) {
                continue;
            }
            if let Err(err) = self.refresh_state(emitter, &field) {
                warn!(key = %emitter, field = %field, error = %err, "check re-run failed");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Drop the stored references and observers kept by a `keep_refs` unmount
    pub(crate) fn forget_refs(&mut self, key: EntityKey) -> Result<()> {
        for node in self.subtree(key)? {
            let entity = self.entity_mut(node)?;
            entity.pending.clear();
            entity.state_observers.clear();
            entity.children_observers.clear();
        }
        Ok(())
    }

    /// Tear down every edge touching `key`
    ///
    /// With `restore`, the edges are turned back into stored references on
    /// every endpoint inside `restore`. Mounted emitters outside the subtree
    /// that lose a check handler are added to `refreshes`.
    fn sever_edges(
        &mut self,
        key: EntityKey,
        restore: Option<&HashSet<EntityKey>>,
        refreshes: &mut Refreshes,
    ) -> Result<()> {
        let entity = self.entity(key)?;
        let mut edges = Vec::new();
        for (channel, connector) in &entity.emitters {
            for remote in connector.endpoints() {
                edges.push(Edge {
                    emitter: key,
                    emitter_channel: channel.clone(),
                    handler: remote.entity,
                    handler_channel: remote.channel.clone(),
                });
            }
        }
        for (channel, slot) in &entity.handlers {
            for remote in slot.connector.endpoints() {
                edges.push(Edge {
                    emitter: remote.entity,
                    emitter_channel: remote.channel.clone(),
                    handler: key,
                    handler_channel: channel.clone(),
                });
            }
        }

        for edge in edges {
            // Self-edges show up on both sides.
            if !self.is_bound(
                edge.emitter,
                &edge.emitter_channel,
                edge.handler,
                &edge.handler_channel,
            ) {
                continue;
            }
            self.unlink(
                edge.emitter,
                &edge.emitter_channel,
                edge.handler,
                &edge.handler_channel,
            )?;

            if edge.emitter != key && self.entity(edge.emitter)?.is_mounted() {
                if let Some(field) = checked_key(&edge.emitter_channel) {
                    let target = (edge.emitter, field.to_string());
                    if !refreshes.contains(&target) {
                        refreshes.push(target);
                    }
                }
            }

            if let Some(members) = restore {
                let emitter_id = self.entity(edge.emitter)?.id().clone();
                let handler_id = self.entity(edge.handler)?.id().clone();
                if members.contains(&edge.emitter) {
                    self.entity_mut(edge.emitter)?.pending.push(PendingEdge {
                        side: Side::Emitter,
                        channel: edge.emitter_channel.clone(),
                        remote: EdgeRef(handler_id, edge.handler_channel.clone()),
                    });
                }
                if members.contains(&edge.handler) {
                    self.entity_mut(edge.handler)?.pending.push(PendingEdge {
                        side: Side::Handler,
                        channel: edge.handler_channel,
                        remote: EdgeRef(emitter_id, edge.emitter_channel),
                    });
                }
            }
        }
        Ok(())
    }
}
