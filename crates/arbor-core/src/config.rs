//! World configuration

use serde::{Deserialize, Deserializer, Serialize};

/// Default limit for nested event delivery
pub const DEFAULT_MAX_EVENT_DEPTH: usize = 64;

/// Configuration for a [`World`](crate::World)
///
/// # Example
///
/// ```
/// use arbor_core::WorldConfig;
///
/// let config = WorldConfig::default()
///     .with_id_prefix("save1-")
///     .with_max_event_depth(0);
/// assert_eq!(config.id_prefix(), Some("save1-"));
/// assert_eq!(config.max_event_depth(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Prefix for generated entity ids
    ///
    /// When `None`, a base-36 timestamp taken at world creation is used, so
    /// ids generated by different sessions do not collide.
    #[serde(default)]
    id_prefix: Option<String>,

    /// How deeply emissions may nest before delivery fails
    ///
    /// Clamped to at least 1.
    #[serde(
        default = "default_max_event_depth",
        deserialize_with = "deserialize_depth"
    )]
    max_event_depth: usize,
}

fn default_max_event_depth() -> usize {
    DEFAULT_MAX_EVENT_DEPTH
}

fn deserialize_depth<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    usize::deserialize(deserializer).map(|depth| depth.max(1))
}

impl WorldConfig {
    /// Use a fixed prefix for generated ids
    ///
    /// Generated ids skip every id already held in the world's arena, but
    /// bundles loaded later are not checked against ids generated earlier.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// Set the nesting limit for event delivery
    pub fn with_max_event_depth(mut self, depth: usize) -> Self {
        self.max_event_depth = depth.max(1);
        self
    }

    pub fn id_prefix(&self) -> Option<&str> {
        self.id_prefix.as_deref()
    }

    pub fn max_event_depth(&self) -> usize {
        self.max_event_depth
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            id_prefix: None,
            max_event_depth: DEFAULT_MAX_EVENT_DEPTH,
        }
    }
}
