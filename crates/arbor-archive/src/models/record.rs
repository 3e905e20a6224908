//! Save metadata and slot records.

use super::Version;
use arbor_core::Bundle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one save slot, shown in a save-selection list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSummary {
    /// Slot id; the smallest positive integer free when the slot was created.
    pub id: u32,
    /// Name chosen by the player.
    pub display_name: String,
    /// Progress read from the root's `progress` state on the last save.
    pub progress: f64,
}

/// Top-level save record, kept under the metadata key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub version: Version,
    #[serde(default)]
    pub slots: Vec<SlotSummary>,
}

impl SaveRecord {
    /// Create an empty record.
    pub fn new(version: Version) -> Self {
        Self {
            version,
            slots: Vec::new(),
        }
    }

    /// Smallest positive slot id not in use.
    pub fn next_slot_id(&self) -> u32 {
        let mut id = 1;
        while self.slots.iter().any(|slot| slot.id == id) {
            id += 1;
        }
        id
    }
}

/// The saved tree of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub version: Version,
    pub saved_at: DateTime<Utc>,
    pub bundle: Bundle,
}

impl SlotRecord {
    /// Stamp a bundle with a version and the current time.
    pub fn new(version: Version, bundle: Bundle) -> Self {
        Self {
            version,
            saved_at: Utc::now(),
            bundle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: u32) -> SlotSummary {
        SlotSummary {
            id,
            display_name: format!("slot {id}"),
            progress: 0.0,
        }
    }

    #[test]
    fn test_next_slot_id_fills_gaps() {
        let mut record = SaveRecord::new(Version::CURRENT);
        assert_eq!(record.next_slot_id(), 1);

        record.slots = vec![summary(1), summary(2), summary(4)];
        assert_eq!(record.next_slot_id(), 3);

        record.slots = vec![summary(2)];
        assert_eq!(record.next_slot_id(), 1);
    }

    #[test]
    fn test_save_record_json() {
        let mut record = SaveRecord::new(Version::new(1, 0, 0));
        record.slots.push(summary(1));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"version":{"major":1,"minor":0,"patch":0},"slots":[{"id":1,"display_name":"slot 1","progress":0.0}]}"#
        );
    }
}
