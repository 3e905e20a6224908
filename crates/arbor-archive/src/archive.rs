//! Save-slot service.

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::models::{SaveRecord, SlotRecord, SlotSummary, Version};
use crate::store::Storage;
use arbor_core::{Bundle, Config, EntityKey, World};
use tracing::{debug, info};

/// Save slots on top of a [`Storage`] backend.
///
/// The save record (version and slot summaries) lives under the metadata key;
/// each slot's tree lives under its own key. At most one slot is active at a
/// time: the one last loaded, which [`Archive::save`] writes back to.
pub struct Archive<S> {
    storage: S,
    config: ArchiveConfig,
    record: SaveRecord,
    active: Option<usize>,
}

impl<S: Storage> Archive<S> {
    /// Open an archive, reading the save record if there is one.
    pub fn open(storage: S, config: ArchiveConfig) -> Result<Self> {
        let record = match storage.read(&config.meta_key)? {
            Some(raw) => {
                let record: SaveRecord = config.format.decode(&raw)?;
                check_version(&config.version, &record.version)?;
                record
            }
            None => SaveRecord::new(config.version),
        };
        debug!(slots = record.slots.len(), version = %record.version, "archive opened");
        Ok(Self {
            storage,
            config,
            record,
            active: None,
        })
    }

    /// Slot summaries, in creation order.
    pub fn slots(&self) -> &[SlotSummary] {
        &self.record.slots
    }

    /// Index of the active slot.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Create a slot holding a fresh tree built from `config`.
    ///
    /// The tree is built in `world` only long enough to serialize it; the
    /// returned bundle is what was written.
    pub fn create(
        &mut self,
        world: &mut World,
        name: impl Into<String>,
        config: &Config,
    ) -> Result<Bundle> {
        let root = world.instantiate(config)?;
        let bundle = world.serialize(root);
        world.destroy(root)?;
        let bundle = bundle?;

        let id = self.record.next_slot_id();
        self.write_slot(id, &bundle)?;
        self.record.slots.push(SlotSummary {
            id,
            display_name: name.into(),
            progress: 0.0,
        });
        self.write_meta()?;
        info!(slot = id, entities = bundle.count(), "slot created");
        Ok(bundle)
    }

    /// Read a slot's tree and make it the active slot.
    pub fn load(&mut self, index: usize) -> Result<Bundle> {
        let id = self.summary(index)?.id;
        let key = self.config.slot_key(id);
        let raw = self
            .storage
            .read(&key)?
            .ok_or_else(|| Error::Storage(format!("missing record: {key}")))?;
        let record: SlotRecord = self.config.format.decode(&raw)?;
        check_version(&self.config.version, &record.version)?;
        self.active = Some(index);
        debug!(slot = id, saved_at = %record.saved_at, "slot loaded");
        Ok(record.bundle)
    }

    /// Write the tree under `root` to the active slot.
    ///
    /// The slot's progress is taken from the root's `progress` state.
    pub fn save(&mut self, world: &World, root: EntityKey) -> Result<()> {
        let index = self.active.ok_or(Error::NoActiveSlot)?;
        let bundle = world.serialize(root)?;
        let progress = bundle
            .state
            .get("progress")
            .and_then(|value| value.as_float())
            .unwrap_or_default();

        let id = self.summary(index)?.id;
        self.write_slot(id, &bundle)?;
        if let Some(summary) = self.record.slots.get_mut(index) {
            summary.progress = progress;
        }
        self.write_meta()?;
        info!(slot = id, progress, "slot saved");
        Ok(())
    }

    /// Remove a slot and its record.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        let id = self.summary(index)?.id;
        self.record.slots.remove(index);
        self.active = match self.active {
            Some(active) if active == index => None,
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        self.write_meta()?;
        self.storage.remove(&self.config.slot_key(id))?;
        info!(slot = id, "slot deleted");
        Ok(())
    }

    /// Forget the active slot.
    pub fn close(&mut self) {
        self.active = None;
    }

    /// Consume the archive, returning its storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    fn summary(&self, index: usize) -> Result<&SlotSummary> {
        self.record
            .slots
            .get(index)
            .ok_or(Error::SlotNotFound(index))
    }

    fn write_slot(&mut self, id: u32, bundle: &Bundle) -> Result<()> {
        let record = SlotRecord::new(self.config.version, bundle.clone());
        let raw = self.config.format.encode(&record)?;
        self.storage.write(&self.config.slot_key(id), &raw)
    }

    fn write_meta(&mut self) -> Result<()> {
        self.record.version = self.config.version;
        let raw = self.config.format.encode(&self.record)?;
        self.storage.write(&self.config.meta_key, &raw)
    }
}

fn check_version(expected: &Version, found: &Version) -> Result<()> {
    if expected.is_compatible(found) {
        Ok(())
    } else {
        Err(Error::IncompatibleVersion {
            found: *found,
            expected: *expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Format;
    use crate::store::MemoryStorage;
    use arbor_core::{Factory, Template, Value, WorldConfig};

    fn factory() -> Factory {
        let mut factory = Factory::new();
        factory
            .register("root", |_| {
                Ok(Template::new()
                    .state("progress", 0.0)
                    .slot("timer", Some(Config::new("timer"))))
            })
            .unwrap();
        factory
            .register("timer", |_| {
                Ok(Template::new().state("time", 0).emitter("tickDone"))
            })
            .unwrap();
        factory
    }

    fn world() -> World {
        World::with_config(factory(), WorldConfig::default().with_id_prefix("a"))
    }

    fn archive(format: Format) -> Archive<MemoryStorage> {
        let config = ArchiveConfig::default().with_format(format);
        Archive::open(MemoryStorage::new(), config).unwrap()
    }

    #[test]
    fn test_create_assigns_smallest_free_id() {
        let mut world = world();
        let mut archive = archive(Format::Json);
        let root = Config::new("root");

        archive.create(&mut world, "first", &root).unwrap();
        archive.create(&mut world, "second", &root).unwrap();
        archive.create(&mut world, "third", &root).unwrap();
        archive.delete(1).unwrap();
        archive.create(&mut world, "fourth", &root).unwrap();

        let ids: Vec<_> = archive.slots().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(archive.slots()[2].display_name, "fourth");
        assert!(world.is_empty());
        let keys: Vec<_> = archive.storage().keys().collect();
        assert_eq!(keys, vec!["meta", "slot_1", "slot_2", "slot_3"]);
    }

    #[test]
    fn test_save_and_reload() {
        for format in [Format::Json, Format::Ron] {
            let mut world = world();
            let mut archive = archive(format);
            archive.create(&mut world, "main", &Config::new("root")).unwrap();

            let bundle = archive.load(0).unwrap();
            let root = world.deserialize(&bundle).unwrap();
            world.mount_root(root).unwrap();
            let timer = world.entity(root).unwrap().slot("timer").unwrap();
            world.set_state(timer, "time", 42).unwrap();
            world.set_state(root, "progress", 0.5).unwrap();
            archive.save(&world, root).unwrap();
            assert_eq!(archive.slots()[0].progress, 0.5);

            let saved = world.serialize(root).unwrap();
            let storage = archive.into_storage();
            let config = ArchiveConfig::default().with_format(format);
            let mut reopened = Archive::open(storage, config).unwrap();
            assert_eq!(reopened.slots()[0].progress, 0.5);
            let bundle = reopened.load(0).unwrap();
            assert_eq!(bundle, saved);
            assert_eq!(bundle.dict["timer"].state.get("time"), Some(&Value::Int(42)));
        }
    }

    #[test]
    fn test_save_requires_active_slot() {
        let mut world = world();
        let mut archive = archive(Format::Json);
        archive.create(&mut world, "main", &Config::new("root")).unwrap();
        let root = world.instantiate(&Config::new("root")).unwrap();

        assert!(matches!(archive.save(&world, root), Err(Error::NoActiveSlot)));
        archive.load(0).unwrap();
        archive.close();
        assert!(matches!(archive.save(&world, root), Err(Error::NoActiveSlot)));
    }

    #[test]
    fn test_delete_shifts_active_slot() {
        let mut world = world();
        let mut archive = archive(Format::Json);
        for name in ["a", "b", "c"] {
            archive.create(&mut world, name, &Config::new("root")).unwrap();
        }
        archive.load(2).unwrap();
        archive.delete(0).unwrap();
        assert_eq!(archive.active(), Some(1));
        archive.delete(1).unwrap();
        assert_eq!(archive.active(), None);
        assert!(matches!(archive.load(5), Err(Error::SlotNotFound(5))));
    }

    #[test]
    fn test_incompatible_versions_are_rejected() {
        let mut world = world();
        let config = ArchiveConfig::default().with_version(Version::new(2, 0, 0));
        let mut archive = Archive::open(MemoryStorage::new(), config).unwrap();
        archive.create(&mut world, "future", &Config::new("root")).unwrap();

        let storage = archive.into_storage();
        let result = Archive::open(storage, ArchiveConfig::default());
        assert!(matches!(
            result,
            Err(Error::IncompatibleVersion { found, .. }) if found.major == 2
        ));
    }

    #[test]
    fn test_unknown_root_code_is_a_core_error() {
        let mut world = world();
        let mut archive = archive(Format::Json);
        let result = archive.create(&mut world, "broken", &Config::new("nope"));
        assert!(matches!(
            result,
            Err(Error::Core(arbor_core::Error::UnknownCode(_)))
        ));
        assert!(archive.slots().is_empty());
    }
}
