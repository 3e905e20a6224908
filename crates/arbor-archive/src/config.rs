//! Archive configuration and record encodings.

use crate::error::{Error, Result};
use crate::models::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Encoding used for records in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    /// Plain JSON, readable by any bundle consumer.
    #[default]
    Json,
    /// RON, for hand-edited saves.
    Ron,
}

impl Format {
    /// Encode a record.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            Format::Json => {
                serde_json::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
            }
            Format::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
                .map_err(|e| Error::Serialization(e.to_string())),
        }
    }

    /// Decode a record.
    pub fn decode<T: DeserializeOwned>(&self, raw: &str) -> Result<T> {
        match self {
            Format::Json => {
                serde_json::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))
            }
            Format::Ron => ron::from_str(raw).map_err(|e| Error::Serialization(e.to_string())),
        }
    }
}

/// Configuration for an [`Archive`](crate::Archive).
///
/// # Example
///
/// ```
/// use arbor_archive::{ArchiveConfig, Format, Version};
///
/// let config = ArchiveConfig::default()
///     .with_format(Format::Ron)
///     .with_slot_prefix("save");
/// assert_eq!(config.slot_key(3), "save_3");
/// assert_eq!(config.version, Version::CURRENT);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Version stamped on written records; records must share its major version.
    #[serde(default)]
    pub version: Version,

    /// Record encoding.
    #[serde(default)]
    pub format: Format,

    /// Storage key of the save record.
    #[serde(default = "default_meta_key")]
    pub meta_key: String,

    /// Prefix of slot record keys (`<prefix>_<slot id>`).
    #[serde(default = "default_slot_prefix")]
    pub slot_prefix: String,
}

fn default_meta_key() -> String {
    "meta".to_string()
}

fn default_slot_prefix() -> String {
    "slot".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            version: Version::CURRENT,
            format: Format::default(),
            meta_key: default_meta_key(),
            slot_prefix: default_slot_prefix(),
        }
    }
}

impl ArchiveConfig {
    /// Set the schema version.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the record encoding.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set the metadata key.
    pub fn with_meta_key(mut self, key: impl Into<String>) -> Self {
        self.meta_key = key.into();
        self
    }

    /// Set the slot key prefix.
    pub fn with_slot_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.slot_prefix = prefix.into();
        self
    }

    /// Storage key of a slot record.
    pub fn slot_key(&self, id: u32) -> String {
        format!("{}_{}", self.slot_prefix, id)
    }
}
