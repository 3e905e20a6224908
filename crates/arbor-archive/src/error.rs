//! Error types for archive operations.

use crate::models::Version;
use thiserror::Error;

/// Errors that can occur while reading or writing save slots.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encoding or decoding error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No slot at the given index.
    #[error("Slot not found: {0}")]
    SlotNotFound(usize),

    /// A record was written by an incompatible schema version.
    #[error("Incompatible version: found {found}, expected {expected}")]
    IncompatibleVersion { found: Version, expected: Version },

    /// Saving requires a loaded slot.
    #[error("No active slot")]
    NoActiveSlot,

    /// Error from the entity runtime.
    #[error("Core error: {0}")]
    Core(#[from] arbor_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
