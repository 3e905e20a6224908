//! Factory: type codes to entity constructors
//!
//! A constructor turns a [`Config`] into a [`Template`]: the declared state,
//! slots, channels and hooks of one entity type. The world then builds the
//! entity and its children from the template, so constructors never touch
//! the registry or the event graph.
//!
//! # Example
//!
//! ```
//! use arbor_core::{Config, Factory, Template, Value, World};
//!
//! let mut factory = Factory::new();
//! factory
//!     .register("timer", |_| {
//!         Ok(Template::new()
//!             .state("time", 0)
//!             .emitter("tickDone"))
//!     })
//!     .unwrap();
//!
//! let mut world = World::new(factory);
//! let timer = world.instantiate(&Config::new("timer").with_state("time", 5)).unwrap();
//! assert_eq!(world.get(timer, "time").unwrap(), Value::Int(5));
//! ```

use crate::connector::{HandlerFn, HandlerSlot};
use crate::entity::{Hook, Hooks, SlotRef};
use crate::{Entity, EntityId, EntityKey, Error, Event, Result, Value, ValueMap, World};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Lightweight, idless description of a subtree to spawn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub code: String,
    /// Initial values, overriding the type's defaults
    #[serde(default, skip_serializing_if = "ValueMap::is_empty")]
    pub state: ValueMap,
    /// List slot children; `None` keeps the type's defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<Config>>,
    /// Dict slot children; missing slots take the type's defaults
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dict: IndexMap<String, Config>,
}

impl Config {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Add a list slot child
    pub fn with_child(mut self, child: Config) -> Self {
        self.list.get_or_insert_with(Vec::new).push(child);
        self
    }

    /// Replace the list slot children; an empty list spawns none
    pub fn with_children(mut self, children: Vec<Config>) -> Self {
        self.list = Some(children);
        self
    }

    /// Set a dict slot child
    pub fn with_slot(mut self, slot: impl Into<String>, child: Config) -> Self {
        self.dict.insert(slot.into(), child);
        self
    }
}

/// Declaration of an entity type, returned by its constructor
#[derive(Clone, Default)]
pub struct Template {
    pub(crate) state: ValueMap,
    pub(crate) list: Option<Vec<Config>>,
    pub(crate) dict: IndexMap<String, Option<Config>>,
    pub(crate) emitters: Vec<String>,
    pub(crate) handlers: IndexMap<String, HandlerFn>,
    pub(crate) hooks: Hooks,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a state key with its default value
    pub fn state(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.state.insert(key.into(), default.into());
        self
    }

    /// Declare the list slot, with the children spawned by default
    pub fn list(mut self, defaults: Vec<Config>) -> Self {
        self.list = Some(defaults);
        self
    }

    /// Declare a dict slot, optionally filled by default
    pub fn slot(mut self, name: impl Into<String>, default: Option<Config>) -> Self {
        self.dict.insert(name.into(), default);
        self
    }

    /// Declare an emitter channel
    ///
    /// `"<key>UpdateBefore"`, `"<key>UpdateDone"` and `"childUpdateDone"`
    /// exist on every entity and need no declaration.
    pub fn emitter(mut self, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        if !self.emitters.contains(&channel) {
            self.emitters.push(channel);
        }
        self
    }

    /// Declare a handler channel and the callback it runs
    pub fn handler(
        mut self,
        channel: impl Into<String>,
        callback: impl Fn(&mut World, EntityKey, &mut Event) -> Result<()> + 'static,
    ) -> Self {
        self.handlers.insert(channel.into(), Rc::new(callback));
        self
    }

    /// Add a hook run after the entity's subtree is mounted
    pub fn on_mount(
        mut self,
        hook: impl Fn(&mut World, EntityKey) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.mount.push(Rc::new(hook) as Hook);
        self
    }

    /// Add a hook run before the entity is unmounted
    pub fn on_unmount(
        mut self,
        hook: impl Fn(&mut World, EntityKey) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.unmount.push(Rc::new(hook) as Hook);
        self
    }

    /// Build a childless entity; returns it with the declared slot defaults
    pub(crate) fn into_entity(self, id: EntityId, code: &str) -> (Entity, SlotDefaults) {
        let mut entity = Entity::new(id, code);
        entity.origin = self.state.clone();
        entity.actual = self.state;
        entity.list = self.list.as_ref().map(|_| Vec::new());
        entity.dict = self.dict.keys().map(|name| (name.clone(), None)).collect();
        entity.declared_emitters = self.emitters;
        entity.handlers = self
            .handlers
            .into_iter()
            .map(|(channel, callback)| {
                let slot = HandlerSlot {
                    callback,
                    connector: Default::default(),
                };
                (channel, slot)
            })
            .collect();
        entity.hooks = self.hooks;
        let defaults = SlotDefaults {
            list: self.list,
            dict: self.dict,
        };
        (entity, defaults)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("state", &self.state)
            .field("list", &self.list)
            .field("dict", &self.dict)
            .field("emitters", &self.emitters)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Children a template spawns when the config does not say otherwise
pub(crate) struct SlotDefaults {
    pub(crate) list: Option<Vec<Config>>,
    pub(crate) dict: IndexMap<String, Option<Config>>,
}

/// Constructor for one entity type
pub type Constructor = Rc<dyn Fn(&Config) -> Result<Template>>;

/// Registry of entity constructors, keyed by type code
#[derive(Clone, Default)]
pub struct Factory {
    constructors: IndexMap<String, Constructor>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for a type code
    pub fn register(
        &mut self,
        code: impl Into<String>,
        constructor: impl Fn(&Config) -> Result<Template> + 'static,
    ) -> Result<()> {
        let code = code.into();
        if self.constructors.contains_key(&code) {
            return Err(Error::DuplicateCode(code));
        }
        self.constructors.insert(code, Rc::new(constructor));
        Ok(())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.constructors.contains_key(code)
    }

    /// Registered codes, in registration order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Run the constructor for `config.code`
    pub fn build(&self, config: &Config) -> Result<Template> {
        let constructor = self
            .constructors
            .get(&config.code)
            .ok_or_else(|| Error::UnknownCode(config.code.clone()))?;
        constructor(config)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("codes", &self.codes().collect::<Vec<_>>())
            .finish()
    }
}

impl World {
    /// Build a detached subtree from a config
    ///
    /// The result is `Created`; attach it to a slot or mount it as the root to
    /// bring it to life. Nothing is left behind if any part fails.
    pub fn instantiate(&mut self, config: &Config) -> Result<EntityKey> {
        let mut created = Vec::new();
        match self.build_node(config, &mut created) {
            Ok(key) => Ok(key),
            Err(err) => {
                for key in created {
                    self.entities.shift_remove(&key);
                }
                Err(err)
            }
        }
    }

    fn build_node(&mut self, config: &Config, created: &mut Vec<EntityKey>) -> Result<EntityKey> {
        let template = self.factory.build(config)?;
        if let Some(slot) = config.dict.keys().find(|s| !template.dict.contains_key(*s)) {
            return Err(Error::UnknownSlot {
                code: config.code.clone(),
                slot: slot.clone(),
            });
        }
        if config.list.is_some() && template.list.is_none() {
            return Err(Error::NoListSlot(config.code.clone()));
        }

        let id = self.allocate_id();
        let (mut entity, defaults) = template.into_entity(id, &config.code);
        for (field, value) in &config.state {
            entity.origin.insert(field.clone(), value.clone());
            entity.actual.insert(field.clone(), value.clone());
        }
        let key = self.insert(entity);
        created.push(key);

        let list = config.list.as_ref().or(defaults.list.as_ref());
        for (index, child) in list.into_iter().flatten().enumerate() {
            let child = self.build_node(child, created)?;
            self.attach(key, &SlotRef::List(index), child)?;
        }
        for (slot, default) in &defaults.dict {
            if let Some(child) = config.dict.get(slot).or(default.as_ref()) {
                let child = self.build_node(child, created)?;
                self.attach(key, &SlotRef::Dict(slot.clone()), child)?;
            }
        }
        Ok(key)
    }

    /// Describe a subtree as an idless config, from its origin state
    pub fn config_of(&self, key: EntityKey) -> Result<Config> {
        let entity = self.entity(key)?;
        let list = match &entity.list {
            Some(children) => Some(
                children
                    .iter()
                    .map(|child| self.config_of(*child))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let mut dict = IndexMap::new();
        for (slot, child) in entity.slots() {
            if let Some(child) = child {
                dict.insert(slot.to_string(), self.config_of(child)?);
            }
        }
        Ok(Config {
            code: entity.code().to_string(),
            state: entity.origin().clone(),
            list,
            dict,
        })
    }
}
