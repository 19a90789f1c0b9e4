//! Presence status types for user online/offline/unavailable tracking.

use serde::{Deserialize, Serialize};

/// Broadcast availability state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceState {
    /// User is actively using a client.
    Online,
    /// User has disconnected or shut down.
    Offline,
    /// User is connected but idle (no recent input).
    Unavailable,
}

impl std::fmt::Display for PresenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A user's current presence record.
///
/// Exactly one record exists per user id at any time; the hub's store is the
/// source of truth during a session, client caches are eventually-consistent
/// copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Opaque stable user identifier.
    pub user_id: String,
    /// Current availability state.
    pub state: PresenceState,
    /// Free-form status text. May carry a legacy `read:<conversation>`
    /// marker from older clients; see [`crate::signal`].
    pub status_token: String,
    /// When the state last changed, used for staleness and ordering.
    pub last_changed_at: Timestamp,
}

impl PresenceRecord {
    /// Returns the default Offline record for a user that has never been seen.
    #[must_use]
    pub fn offline(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: PresenceState::Offline,
            status_token: String::new(),
            last_changed_at: Timestamp::from_millis(0),
        }
    }
}
