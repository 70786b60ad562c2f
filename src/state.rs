//! State-change detection
//!
//! Tracks the last-seen content hash of every observed attribute and
//! constant, keyed so the three keyspaces (object attributes, type
//! attributes, qualified constants) can never collide. Entries live for the
//! whole session and are dropped only at engine teardown.

use crate::event::IdentityToken;
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Tracking key for one observed entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Mutable attribute of a specific object
    ObjectAttribute {
        identity: IdentityToken,
        name: String,
    },
    /// Shared attribute of a type
    TypeAttribute { type_name: String, name: String },
    /// Qualified constant
    Constant { qualified_name: String },
}

/// Outcome of observing an entity's current value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First observation of this key in the session
    Created,
    /// Content hash matches the previous observation
    Unchanged,
    /// Content hash differs from the previous observation
    Changed { previous_record_id: u64 },
    /// A constant changed content; carries a redefinition warning downstream
    Redefined { previous_record_id: u64 },
}

#[derive(Debug, Clone)]
struct TrackedEntry {
    digest: [u8; 32],
    record_id: u64,
}

/// Per-session attribute and constant history
#[derive(Debug, Default)]
pub struct StateTracker {
    entries: HashMap<StateKey, TrackedEntry>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the rendered content of `key` at `record_id`
    ///
    /// The stored record id advances only on created and changed
    /// observations. Unchanged sightings are omitted from records, so a
    /// later `Changed` must point at the last record that actually
    /// surfaced an entry for the key.
    pub fn observe(&mut self, key: StateKey, rendered: &str, record_id: u64) -> Observation {
        let digest = content_digest(rendered);
        let is_constant = matches!(key, StateKey::Constant { .. });

        match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(TrackedEntry { digest, record_id });
                Observation::Created
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.digest == digest {
                    return Observation::Unchanged;
                }
                let previous_record_id = entry.record_id;
                entry.digest = digest;
                entry.record_id = record_id;
                if is_constant {
                    Observation::Redefined { previous_record_id }
                } else {
                    Observation::Changed { previous_record_id }
                }
            }
        }
    }

    /// Number of distinct entities tracked this session
    pub fn tracked_count(&self) -> usize {
        self.entries.len()
    }

    /// Sorted qualified names of all tracked constants
    pub fn constant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter_map(|key| match key {
                StateKey::Constant { qualified_name } => Some(qualified_name.clone()),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }
}

/// SHA-256 digest of rendered content
fn content_digest(rendered: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_key(name: &str) -> StateKey {
        StateKey::ObjectAttribute {
            identity: IdentityToken(7),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_first_observation_is_created() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.observe(object_key("@total"), "0", 1), Observation::Created);
        assert_eq!(tracker.tracked_count(), 1);
    }

    #[test]
    fn test_same_content_is_unchanged() {
        let mut tracker = StateTracker::new();
        tracker.observe(object_key("@total"), "0", 1);
        assert_eq!(tracker.observe(object_key("@total"), "0", 2), Observation::Unchanged);
    }

    #[test]
    fn test_changed_points_at_last_surfaced_observation() {
        let mut tracker = StateTracker::new();
        tracker.observe(object_key("@total"), "0", 1);
        // Unchanged sightings surface nothing and must not move the pointer
        tracker.observe(object_key("@total"), "0", 5);
        assert_eq!(
            tracker.observe(object_key("@total"), "100", 9),
            Observation::Changed {
                previous_record_id: 1
            }
        );
        // And the chain continues from the surfaced change
        assert_eq!(
            tracker.observe(object_key("@total"), "200", 12),
            Observation::Changed {
                previous_record_id: 9
            }
        );
    }

    #[test]
    fn test_constant_change_is_redefinition() {
        let mut tracker = StateTracker::new();
        let key = StateKey::Constant {
            qualified_name: "Billing::RATE".to_string(),
        };
        assert_eq!(tracker.observe(key.clone(), "0.05", 3), Observation::Created);
        assert_eq!(
            tracker.observe(key, "0.07", 8),
            Observation::Redefined {
                previous_record_id: 3
            }
        );
    }

    #[test]
    fn test_keyspaces_do_not_collide() {
        let mut tracker = StateTracker::new();
        let object = StateKey::ObjectAttribute {
            identity: IdentityToken(1),
            name: "RATE".to_string(),
        };
        let typed = StateKey::TypeAttribute {
            type_name: "RATE".to_string(),
            name: "RATE".to_string(),
        };
        let constant = StateKey::Constant {
            qualified_name: "RATE".to_string(),
        };
        assert_eq!(tracker.observe(object, "1", 1), Observation::Created);
        assert_eq!(tracker.observe(typed, "1", 2), Observation::Created);
        assert_eq!(tracker.observe(constant, "1", 3), Observation::Created);
        assert_eq!(tracker.tracked_count(), 3);
    }

    #[test]
    fn test_distinct_identities_track_separately() {
        let mut tracker = StateTracker::new();
        let first = StateKey::ObjectAttribute {
            identity: IdentityToken(1),
            name: "@total".to_string(),
        };
        let second = StateKey::ObjectAttribute {
            identity: IdentityToken(2),
            name: "@total".to_string(),
        };
        tracker.observe(first, "0", 1);
        assert_eq!(tracker.observe(second, "0", 2), Observation::Created);
    }

    #[test]
    fn test_constant_names_sorted() {
        let mut tracker = StateTracker::new();
        for name in ["Z::LAST", "A::FIRST", "M::MIDDLE"] {
            tracker.observe(
                StateKey::Constant {
                    qualified_name: name.to_string(),
                },
                "1",
                1,
            );
        }
        assert_eq!(tracker.constant_names(), vec!["A::FIRST", "M::MIDDLE", "Z::LAST"]);
    }
}
