//! Error types for arbor-core

use crate::{EntityId, EntityKey, Status};
use thiserror::Error;

/// Which class of failure an [`Error`] belongs to
///
/// None of them are recoverable by the runtime itself: the event graph has no
/// way to repair an inconsistent binding, so every error surfaces to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The tree, registry or event graph would become inconsistent
    InvariantViolation,
    /// Unknown type tag, bad config or malformed bundle
    Configuration,
    /// An operation was called in the wrong lifecycle state
    LifecycleMisuse,
}

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Duplicate id: {0} is already registered")]
    DuplicateId(EntityId),

    #[error("Id not registered: {0}")]
    IdNotRegistered(EntityId),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityKey),

    #[error("Entity {child} is already attached to {parent}")]
    AlreadyAttached { child: EntityId, parent: EntityKey },

    #[error("Entity {child} is an ancestor of {parent} and cannot become its child")]
    OwnershipCycle { child: EntityId, parent: EntityId },

    #[error("Entity {child} is not a child of {parent}")]
    NotAChild { parent: EntityId, child: EntityId },

    #[error("Unknown slot '{slot}' on {code}")]
    UnknownSlot { code: String, slot: String },

    #[error("Type {0} declares no list slot")]
    NoListSlot(String),

    #[error("Unknown channel '{channel}' on {id}")]
    UnknownChannel { id: EntityId, channel: String },

    #[error("Edge already bound: {emitter}.{emitter_channel} -> {handler}.{handler_channel}")]
    EdgeAlreadyBound {
        emitter: EntityId,
        emitter_channel: String,
        handler: EntityId,
        handler_channel: String,
    },

    #[error("Edge not bound: {emitter}.{emitter_channel} -> {handler}.{handler_channel}")]
    EdgeNotBound {
        emitter: EntityId,
        emitter_channel: String,
        handler: EntityId,
        handler_channel: String,
    },

    #[error("Unresolved edge: {id}.{channel} references {remote}.{remote_channel}")]
    UnresolvedEdge {
        id: EntityId,
        channel: String,
        remote: EntityId,
        remote_channel: String,
    },

    #[error("Re-entrant update of '{key}' on {id} during its check phase")]
    ReentrantUpdate { id: EntityId, key: String },

    #[error("Event nesting exceeded the configured depth of {0}")]
    EventDepthExceeded(usize),

    #[error("Unknown type code: {0}")]
    UnknownCode(String),

    #[error("Type code registered twice: {0}")]
    DuplicateCode(String),

    #[error("Malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("Invalid status for {id}: expected one of {expected:?}, got {actual:?}")]
    InvalidStatus {
        id: EntityId,
        expected: Vec<Status>,
        actual: Status,
    },

    #[error("Entity {0} is not mounted")]
    NotMounted(EntityId),

    #[error("World already has a mounted root")]
    RootAlreadyMounted,

    #[error("World has no mounted root")]
    NoRoot,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownCode(_) | Error::DuplicateCode(_) | Error::MalformedBundle(_) => {
                ErrorKind::Configuration
            }
            Error::InvalidStatus { .. }
            | Error::NotMounted(_)
            | Error::RootAlreadyMounted
            | Error::NoRoot => ErrorKind::LifecycleMisuse,
            _ => ErrorKind::InvariantViolation,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
