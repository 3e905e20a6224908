//! Schema version triple.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version stamped on every record.
///
/// Records are readable when the major version matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Version written by this crate when none is configured.
    pub const CURRENT: Version = Version::new(1, 0, 0);

    /// Create a version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Check if a record written with `other` can be read by this version.
    pub fn is_compatible(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
