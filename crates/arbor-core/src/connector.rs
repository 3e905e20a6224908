//! Connectors: the emitter/handler edges of the event graph
//!
//! An emitter channel and a handler channel each keep an ordered list of the
//! endpoints bound to them. A bound pair is recorded on both sides, so either
//! entity can tear the edge down without a back-pointer. Endpoints are arena
//! keys, never references, which keeps the graph free of ownership cycles.

use crate::{EntityId, EntityKey, Result, Value, World};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Channel fired after every children-slot mutation
pub const CHILD_UPDATE_DONE: &str = "childUpdateDone";

const UPDATE_BEFORE: &str = "UpdateBefore";
const UPDATE_DONE: &str = "UpdateDone";

/// Name of the check channel for a state key (`"<key>UpdateBefore"`)
pub fn update_before(key: &str) -> String {
    format!("{key}{UPDATE_BEFORE}")
}

/// Name of the commit channel for a state key (`"<key>UpdateDone"`)
pub fn update_done(key: &str) -> String {
    format!("{key}{UPDATE_DONE}")
}

/// If `channel` is a check channel, return the state key it guards
pub fn checked_key(channel: &str) -> Option<&str> {
    channel
        .strip_suffix(UPDATE_BEFORE)
        .filter(|key| !key.is_empty())
}

/// Check if a channel is derived from a state key or from the children slots
pub(crate) fn is_builtin_emitter(channel: &str) -> bool {
    if channel == CHILD_UPDATE_DONE {
        return true;
    }
    checked_key(channel).is_some()
        || channel
            .strip_suffix(UPDATE_DONE)
            .is_some_and(|key| !key.is_empty())
}

/// Callback invoked when an event reaches a bound handler
///
/// Receives the world, the key of the entity owning the handler and the event.
/// Fixed when the entity is constructed.
pub type HandlerFn = Rc<dyn Fn(&mut World, EntityKey, &mut Event) -> Result<()>>;

/// One side of a bound edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Entity owning the remote channel
    pub entity: EntityKey,
    /// Name of the remote channel
    pub channel: String,
}

impl Endpoint {
    pub fn new(entity: EntityKey, channel: impl Into<String>) -> Self {
        Self {
            entity,
            channel: channel.into(),
        }
    }
}

/// Serialized endpoint: `(remote id, remote channel)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRef(pub EntityId, pub String);

/// Ordered list of endpoints bound to one channel
#[derive(Debug, Clone, Default)]
pub(crate) struct Connector {
    bound: Vec<Endpoint>,
}

impl Connector {
    pub(crate) fn attach(&mut self, endpoint: Endpoint) {
        self.bound.push(endpoint);
    }

    pub(crate) fn detach(&mut self, endpoint: &Endpoint) -> bool {
        match self.bound.iter().position(|e| e == endpoint) {
            Some(index) => {
                self.bound.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, endpoint: &Endpoint) -> bool {
        self.bound.contains(endpoint)
    }

    pub(crate) fn endpoints(&self) -> &[Endpoint] {
        &self.bound
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// A handler channel: its callback plus the emitters bound to it
#[derive(Clone)]
pub(crate) struct HandlerSlot {
    pub(crate) callback: HandlerFn,
    pub(crate) connector: Connector,
}

/// Payload of a [`StateUpdate`]-carrying event
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    key: String,
    prev: Value,
    /// The pending (check phase) or committed (done phase) value
    ///
    /// Check handlers overwrite this to clamp, derive or veto the update.
    pub next: Value,
}

impl StateUpdate {
    pub(crate) fn new(key: impl Into<String>, prev: Value, next: Value) -> Self {
        Self {
            key: key.into(),
            prev,
            next,
        }
    }

    /// The state key being updated
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The actual value before this update
    pub fn prev(&self) -> &Value {
        &self.prev
    }
}

/// What an event carries
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Arbitrary value emitted by game code
    Signal(Value),
    /// A state update, on `<key>UpdateBefore` and `<key>UpdateDone`
    Update(StateUpdate),
    /// Full children snapshot, on `childUpdateDone`
    Children(Vec<EntityKey>),
}

/// An event travelling from one emitter to its bound handlers
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    source: EntityKey,
    channel: String,
    payload: Payload,
}

impl Event {
    pub(crate) fn new(source: EntityKey, channel: impl Into<String>, payload: Payload) -> Self {
        Self {
            source,
            channel: channel.into(),
            payload,
        }
    }

    /// The entity that emitted this event
    pub fn source(&self) -> EntityKey {
        self.source
    }

    /// The emitter channel
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Signal value, if this is a signal
    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Signal(value) => Some(value),
            _ => None,
        }
    }

    /// State update, if this is a check or commit event
    pub fn update(&self) -> Option<&StateUpdate> {
        match &self.payload {
            Payload::Update(update) => Some(update),
            _ => None,
        }
    }

    /// Mutable state update; only `next` can be changed
    pub fn update_mut(&mut self) -> Option<&mut StateUpdate> {
        match &mut self.payload {
            Payload::Update(update) => Some(update),
            _ => None,
        }
    }

    /// Children snapshot, if this is a `childUpdateDone` event
    pub fn children(&self) -> Option<&[EntityKey]> {
        match &self.payload {
            Payload::Children(children) => Some(children),
            _ => None,
        }
    }

    pub(crate) fn into_update(self) -> Option<StateUpdate> {
        match self.payload {
            Payload::Update(update) => Some(update),
            _ => None,
        }
    }
}
