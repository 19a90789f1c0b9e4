//! Local read-through cache of remote presence.
//!
//! The cache is an eventually-consistent copy of the hub's store. Reads
//! never block on the network and never error: an unseen user is simply
//! Offline.

use std::collections::HashMap;

use parking_lot::RwLock;
use vigil_proto::presence::{PresenceRecord, PresenceState, Timestamp};

/// Read-mostly map of the last known presence per user.
#[derive(Default)]
pub struct PresenceCache {
    records: RwLock<HashMap<String, PresenceRecord>>,
}

impl PresenceCache {
    /// Creates a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a presence change received from the hub.
    pub fn insert(&self, user_id: &str, state: PresenceState, status_token: &str) {
        let mut records = self.records.write();
        records.insert(
            user_id.to_string(),
            PresenceRecord {
                user_id: user_id.to_string(),
                state,
                status_token: status_token.to_string(),
                last_changed_at: Timestamp::now(),
            },
        );
    }

    /// Returns the cached record for a user, or a default Offline record
    /// if the user has never been seen. Never blocks on the network.
    pub fn get(&self, user_id: &str) -> PresenceRecord {
        let records = self.records.read();
        records
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| PresenceRecord::offline(user_id))
    }
}
