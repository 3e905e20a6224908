//! Arbor Archive - Save slots for arbor worlds.
//!
//! Provides persistent storage for:
//! - A save record listing every slot with its name and progress
//! - One serialized entity tree per slot
//!
//! Records are encoded as JSON or RON and written through a [`Storage`]
//! backend: in memory, or one file per key in a directory.

mod archive;
mod config;
mod error;
mod models;
mod store;

pub use archive::Archive;
pub use config::{ArchiveConfig, Format};
pub use error::{Error, Result};
pub use models::{SaveRecord, SlotRecord, SlotSummary, Version};
pub use store::{DirStorage, MemoryStorage, Storage};
