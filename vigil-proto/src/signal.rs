//! Ephemeral conversation-scoped signals: read markers and typing indicators.
//!
//! Signals are relayed by the hub but never written to the presence store.
//! Older clients encoded the read marker inside the free-text status token of
//! a presence update (`read:<conversationId>`); the tagged [`Signal`] enum
//! replaces that, and [`Signal::from_status_token`] keeps those updates
//! interpretable.

use serde::{Deserialize, Serialize};

/// Prefix used by the legacy status-token encoding of a read marker.
const READ_TOKEN_PREFIX: &str = "read:";

/// A transient, non-persisted event relayed between clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// The sender is actively viewing the given conversation.
    Read {
        /// Conversation the sender has open.
        conversation_id: String,
    },
    /// The sender started or stopped typing in the given conversation.
    Typing {
        /// Conversation where typing is occurring.
        conversation_id: String,
        /// Whether the sender is currently typing.
        is_typing: bool,
    },
}

impl Signal {
    /// Decodes a legacy `read:<conversationId>` status token.
    ///
    /// Returns `None` for ordinary human-readable status text.
    #[must_use]
    pub fn from_status_token(token: &str) -> Option<Self> {
        let conversation_id = token.strip_prefix(READ_TOKEN_PREFIX)?;
        if conversation_id.is_empty() {
            return None;
        }
        Some(Self::Read {
            conversation_id: conversation_id.to_string(),
        })
    }

    /// Encodes a read signal as the legacy status token.
    ///
    /// Typing signals have no legacy token form and return `None`.
    #[must_use]
    pub fn to_status_token(&self) -> Option<String> {
        match self {
            Self::Read { conversation_id } => {
                Some(format!("{READ_TOKEN_PREFIX}{conversation_id}"))
            }
            Self::Typing { .. } => None,
        }
    }
}
