//! Bundles: the full serialized form of a subtree
//!
//! A bundle keeps ids and, for every channel, the `(remote id, remote
//! channel)` pairs bound to it. Loading a bundle only stores those pairs;
//! they become live edges when the entities mount.

use crate::entity::{PendingEdge, Side, SlotRef};
use crate::{Config, EdgeRef, EntityId, EntityKey, Error, Result, ValueMap, World};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Serialized entity subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: EntityId,
    pub code: String,
    /// Actual state
    #[serde(default)]
    pub state: ValueMap,
    /// Origin values that differ from the actual state
    #[serde(default, skip_serializing_if = "ValueMap::is_empty")]
    pub origin: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<Bundle>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dict: IndexMap<String, Bundle>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub emitters: IndexMap<String, Vec<EdgeRef>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub handlers: IndexMap<String, Vec<EdgeRef>>,
}

impl Bundle {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::MalformedBundle(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::MalformedBundle(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedBundle(e.to_string()))
    }

    /// Number of entities in the bundle
    pub fn count(&self) -> usize {
        1 + self.list.iter().flatten().map(Bundle::count).sum::<usize>()
            + self.dict.values().map(Bundle::count).sum::<usize>()
    }
}

impl World {
    /// Serialize a subtree, depth-first
    ///
    /// Live edges and references still waiting for mount are both written.
    pub fn serialize(&self, key: EntityKey) -> Result<Bundle> {
        let entity = self.entity(key)?;

        let origin = entity
            .origin
            .iter()
            .filter(|(field, value)| entity.actual.get(*field) != Some(*value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let list = match &entity.list {
            Some(children) => Some(
                children
                    .iter()
                    .map(|child| self.serialize(*child))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let mut dict = IndexMap::new();
        for (slot, child) in entity.slots() {
            if let Some(child) = child {
                dict.insert(slot.to_string(), self.serialize(child)?);
            }
        }

        let mut emitters: IndexMap<String, Vec<EdgeRef>> = IndexMap::new();
        for (channel, connector) in &entity.emitters {
            for remote in connector.endpoints() {
                let remote_id = self.entity(remote.entity)?.id().clone();
                emitters
                    .entry(channel.clone())
                    .or_default()
                    .push(EdgeRef(remote_id, remote.channel.clone()));
            }
        }
        let mut handlers: IndexMap<String, Vec<EdgeRef>> = IndexMap::new();
        for (channel, slot) in &entity.handlers {
            for remote in slot.connector.endpoints() {
                let remote_id = self.entity(remote.entity)?.id().clone();
                handlers
                    .entry(channel.clone())
                    .or_default()
                    .push(EdgeRef(remote_id, remote.channel.clone()));
            }
        }
        for edge in &entity.pending {
            let side = match edge.side {
                Side::Emitter => &mut emitters,
                Side::Handler => &mut handlers,
            };
            side.entry(edge.channel.clone())
                .or_default()
                .push(edge.remote.clone());
        }

        Ok(Bundle {
            id: entity.id().clone(),
            code: entity.code().to_string(),
            state: entity.actual.clone(),
            origin,
            list,
            dict,
            emitters,
            handlers,
        })
    }

    /// Rebuild a detached subtree from a bundle
    ///
    /// Ids come from the bundle. Edge references are kept until the subtree
    /// mounts; mounting fails if any of them cannot be resolved then. Nothing
    /// is left behind if loading fails.
    pub fn deserialize(&mut self, bundle: &Bundle) -> Result<EntityKey> {
        let mut created = Vec::new();
        match self.restore_node(bundle, &mut created) {
            Ok(key) => Ok(key),
            Err(err) => {
                warn!(id = %bundle.id, error = %err, "bundle rejected");
                for key in created {
                    self.entities.shift_remove(&key);
                }
                Err(err)
            }
        }
    }

    fn restore_node(&mut self, bundle: &Bundle, created: &mut Vec<EntityKey>) -> Result<EntityKey> {
        let stub = Config {
            code: bundle.code.clone(),
            state: bundle.state.clone(),
            ..Config::default()
        };
        let template = self.factory.build(&stub)?;
        let (mut entity, _) = template.into_entity(bundle.id.clone(), &bundle.code);

        if bundle.list.is_some() && entity.list.is_none() {
            return Err(malformed(bundle, "list slot", "list"));
        }
        if let Some(slot) = bundle.dict.keys().find(|s| !entity.dict.contains_key(*s)) {
            return Err(malformed(bundle, "slot", slot));
        }

        for (field, value) in &bundle.state {
            entity.actual.insert(field.clone(), value.clone());
            entity.origin.insert(field.clone(), value.clone());
        }
        for (field, value) in &bundle.origin {
            entity.origin.insert(field.clone(), value.clone());
        }

        for (channel, remotes) in &bundle.emitters {
            if !entity.accepts_emitter(channel) {
                return Err(malformed(bundle, "emitter", channel));
            }
            for remote in remotes {
                entity.pending.push(PendingEdge {
                    side: Side::Emitter,
                    channel: channel.clone(),
                    remote: remote.clone(),
                });
            }
        }
        for (channel, remotes) in &bundle.handlers {
            if !entity.handlers.contains_key(channel) {
                return Err(malformed(bundle, "handler", channel));
            }
            for remote in remotes {
                entity.pending.push(PendingEdge {
                    side: Side::Handler,
                    channel: channel.clone(),
                    remote: remote.clone(),
                });
            }
        }

        let key = self.insert(entity);
        created.push(key);

        for (index, child) in bundle.list.iter().flatten().enumerate() {
            let child = self.restore_node(child, created)?;
            self.attach(key, &SlotRef::List(index), child)?;
        }
        for (slot, child) in &bundle.dict {
            let child = self.restore_node(child, created)?;
            self.attach(key, &SlotRef::Dict(slot.clone()), child)?;
        }
        Ok(key)
    }
}

fn malformed(bundle: &Bundle, what: &str, name: &str) -> Error {
    Error::MalformedBundle(format!(
        "{} ({}) has no {} '{}'",
        bundle.id, bundle.code, what, name
    ))
}
