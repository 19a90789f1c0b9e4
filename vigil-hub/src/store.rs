//! Authoritative in-memory presence store, keyed by user id.
//!
//! The [`PresenceStore`] is owned by the hub and mutated only from its
//! dispatch path. Client-side caches are eventually-consistent copies;
//! this map is the single source of truth during a session.

use std::collections::HashMap;

use tokio::sync::RwLock;
use vigil_proto::presence::{PresenceRecord, PresenceState, Timestamp};

/// Key-value store of one [`PresenceRecord`] per user.
///
/// Thread-safe via [`RwLock`]; writes are infrequent relative to reads.
#[derive(Default)]
pub struct PresenceStore {
    records: RwLock<HashMap<String, PresenceRecord>>,
}

impl PresenceStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the record for a user, stamping `last_changed_at` with now.
    ///
    /// Empty user ids are ignored; identity must be bound before any write.
    pub async fn set(&self, user_id: &str, state: PresenceState, status_token: &str) {
        if user_id.is_empty() {
            return;
        }
        let mut records = self.records.write().await;
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

    /// Returns the current record for a user, or a default Offline record
    /// with an empty token if the user has never been seen. Never errors.
    pub async fn get(&self, user_id: &str) -> PresenceRecord {
        let records = self.records.read().await;
        records
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| PresenceRecord::offline(user_id))
    }

    /// Returns every record except the one for `user_id`.
    ///
    /// Used to build the full snapshot sent to a newly connected client,
    /// which never includes the client's own identity.
    pub async fn snapshot_except(&self, user_id: &str) -> Vec<PresenceRecord> {
        let records = self.records.read().await;
        records
            .values()
            .filter(|r| r.user_id != user_id)
            .cloned()
            .collect()
    }
}
