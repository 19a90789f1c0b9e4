//! Hub wire protocol frames and their postcard encoding.
//!
//! Frames are sent as binary WebSocket messages between clients and the
//! presence hub. The handshake itself carries no frame: clients supply their
//! user id as a `user_id` query parameter on the WebSocket URL, and the hub
//! closes the connection with [`CLOSE_MISSING_USER_ID`] if it is absent.

use serde::{Deserialize, Serialize};

use crate::presence::PresenceState;
use crate::signal::Signal;

/// Close code sent when a connection arrives without a user id.
pub const CLOSE_MISSING_USER_ID: u16 = 4000;

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Frames sent from a client to the hub.
///
/// The sender's identity is bound at connect time, so frames carry no
/// `user_id` of their own — the hub attaches it on fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Durable presence update, written to the hub's store and broadcast.
    Presence {
        /// New availability state.
        state: PresenceState,
        /// Free-form status text.
        status_token: String,
    },
    /// Ephemeral signal, relayed to all connections but never stored.
    Signal(Signal),
}

/// Frames sent from the hub to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubFrame {
    /// A durable presence change, used both for the connect-time snapshot
    /// and for ongoing broadcasts.
    Presence {
        /// The user whose presence changed.
        user_id: String,
        /// The new availability state.
        state: PresenceState,
        /// Free-form status text.
        status_token: String,
    },
    /// An ephemeral signal relayed verbatim, with the sender attached.
    Signal {
        /// The user who sent the signal.
        user_id: String,
        /// The relayed signal.
        signal: Signal,
    },
}

/// Encodes a [`ClientFrame`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_client(bytes: &[u8]) -> Result<ClientFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`HubFrame`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_hub(frame: &HubFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`HubFrame`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the bytes cannot be deserialized.
pub fn decode_hub(bytes: &[u8]) -> Result<HubFrame, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
