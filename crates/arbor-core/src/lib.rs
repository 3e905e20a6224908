//! Arbor Core - Reactive entity-graph runtime
//!
//! This crate provides the runtime for a live application state tree:
//! - Entities in an ownership tree, held in a per-world arena
//! - A two-phase state pipeline (`<key>UpdateBefore` check, `<key>UpdateDone` commit)
//! - Emitter/handler edges forming an event graph independent of the tree
//! - A lifecycle state machine that registers ids and resolves edges on mount
//! - A factory of entity types and a bundle format for save/restore
//!
//! ## Worlds
//!
//! Everything lives in a [`World`]: the arena, the identity [`Registry`] and
//! the [`Factory`]. Worlds are independent, so several trees (or tests) never
//! share state. Execution is single-threaded and synchronous: every
//! operation, including all the handlers it triggers, completes before it
//! returns.
//!
//! ```
//! use arbor_core::{Config, Factory, Template, World};
//!
//! let mut factory = Factory::new();
//! factory
//!     .register("timer", |_| Ok(Template::new().state("time", 0).emitter("tickDone")))
//!     .unwrap();
//! factory
//!     .register("clock", |_| {
//!         Ok(Template::new()
//!             .state("seen", 0)
//!             .handler("onTick", |world, me, _| {
//!                 world.modify_state(me, "seen", |n| n.offset(1).unwrap_or_default())?;
//!                 Ok(())
//!             }))
//!     })
//!     .unwrap();
//! factory
//!     .register("root", |_| {
//!         Ok(Template::new()
//!             .slot("timer", Some(Config::new("timer")))
//!             .slot("clock", Some(Config::new("clock"))))
//!     })
//!     .unwrap();
//!
//! let mut world = World::new(factory);
//! let root = world.instantiate(&Config::new("root")).unwrap();
//! world.mount_root(root).unwrap();
//!
//! let timer = world.entity(root).unwrap().slot("timer").unwrap();
//! let clock = world.entity(root).unwrap().slot("clock").unwrap();
//! world.bind(timer, "tickDone", clock, "onTick").unwrap();
//! world.emit(timer, "tickDone", 1).unwrap();
//! assert_eq!(world.get(clock, "seen").unwrap().as_int(), Some(1));
//! ```

mod bundle;
mod children;
mod config;
mod connector;
mod entity;
mod error;
mod factory;
mod graph;
mod identity;
mod lifecycle;
mod observer;
mod registry;
mod state;
mod value;
mod world;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod proptests;

pub use bundle::Bundle;
pub use config::{WorldConfig, DEFAULT_MAX_EVENT_DEPTH};
pub use connector::{
    checked_key, update_before, update_done, EdgeRef, Endpoint, Event, HandlerFn, Payload,
    StateUpdate, CHILD_UPDATE_DONE,
};
pub use entity::{Entity, Hook};
pub use error::{Error, ErrorKind, Result};
pub use factory::{Config, Constructor, Factory, Template};
pub use identity::{EntityId, EntityKey};
pub use lifecycle::Status;
pub use observer::{ChildrenObserver, ObserverId, StateObserver};
pub use registry::Registry;
pub use value::{Value, ValueMap};
pub use world::World;
