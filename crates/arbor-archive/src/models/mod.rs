//! Persisted record types.

mod record;
mod version;

pub use record::*;
pub use version::*;
