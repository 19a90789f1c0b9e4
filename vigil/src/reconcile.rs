//! Delivery and read reconciliation for the last locally-authored message
//! of a conversation.
//!
//! The reconciler merges three evidence sources into one delivery phase:
//! transport acks (`confirm_sent`/`fail_send`), inferred peer evidence from
//! presence events (Online implies delivered, a read signal implies read),
//! and authoritative native read receipts. Read always beats delivered,
//! regardless of arrival order.

use std::time::Duration;

use vigil_proto::presence::{PresenceState, Timestamp};
use vigil_proto::signal::Signal;

use crate::client::{HubClient, PresenceEvent};
use crate::status::{StatusStore, delivered_key, read_key};

/// Prefix applied to the displayed body when the transport rejects a send.
const SEND_FAILURE_PREFIX: &str = "failed to send: ";

/// Delivery phase of the tracked message.
///
/// `Sending → Sent → Delivered → Read`, with `Failed` reachable only from
/// `Sending` and absorbing. Phases never regress within a session except
/// for one case: an authoritative native receipt for a *different* message
/// retracts an inferred `Read` back to `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    /// Handed to the transport, no ack yet; the id is a local placeholder.
    Sending,
    /// The transport accepted the message and assigned a permanent id.
    Sent,
    /// The peer's client has received the message.
    Delivered,
    /// The peer has seen the message.
    Read,
    /// The transport rejected the send. Terminal.
    Failed,
}

/// The single message the reconciler tracks, always the most recent
/// locally-authored one.
#[derive(Debug, Clone)]
pub struct TrackedMessage {
    /// Placeholder `temp-<millis>` id until `confirm_sent` swaps in the
    /// transport-assigned one.
    pub id: String,
    /// Displayed body; rewritten with a failure marker on `fail_send`.
    pub body: String,
    /// Current delivery phase.
    pub phase: DeliveryPhase,
}

/// One message from the reloaded conversation history, used by
/// [`Reconciler::restore`] to validate persisted markers.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Transport-assigned message id.
    pub id: String,
    /// Author user id.
    pub author: String,
    /// Message body.
    pub body: String,
}

/// Per-conversation delivery reconciler.
pub struct Reconciler<S: StatusStore> {
    conversation_id: String,
    self_id: String,
    peer_id: String,
    store: S,
    tracked: Option<TrackedMessage>,
}

impl<S: StatusStore> Reconciler<S> {
    /// Creates a reconciler for a two-party conversation.
    pub fn new(conversation_id: &str, self_id: &str, peer_id: &str, store: S) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            self_id: self_id.to_string(),
            peer_id: peer_id.to_string(),
            store,
            tracked: None,
        }
    }

    /// The currently tracked message, if any.
    #[must_use]
    pub fn tracked(&self) -> Option<&TrackedMessage> {
        self.tracked.as_ref()
    }

    /// Starts tracking a new outgoing message under a `temp-<millis>`
    /// placeholder id, superseding any previously tracked message. Returns
    /// the placeholder id.
    pub fn begin_send(&mut self, body: &str) -> String {
        let id = format!("temp-{}", Timestamp::now().as_millis());
        self.tracked = Some(TrackedMessage {
            id: id.clone(),
            body: body.to_string(),
            phase: DeliveryPhase::Sending,
        });
        id
    }

    /// Transport ack: swaps the placeholder for the permanent id and moves
    /// to `Sent`. Ignored unless the tracked message is still `Sending`.
    pub fn confirm_sent(&mut self, permanent_id: &str) {
        if let Some(msg) = self.tracked.as_mut() {
            if msg.phase == DeliveryPhase::Sending {
                msg.id = permanent_id.to_string();
                msg.phase = DeliveryPhase::Sent;
            }
        }
    }

    /// Transport rejection: marks the message `Failed` and rewrites the
    /// displayed body with a failure marker. Only valid from `Sending`;
    /// the phase is terminal and there is no automatic retry.
    pub fn fail_send(&mut self) {
        if let Some(msg) = self.tracked.as_mut() {
            if msg.phase == DeliveryPhase::Sending {
                msg.body = format!("{SEND_FAILURE_PREFIX}{}", msg.body);
                msg.phase = DeliveryPhase::Failed;
                tracing::warn!(id = %msg.id, "message send failed");
            }
        }
    }

    /// Applies one hub event, filtered to the conversation peer.
    ///
    /// A read signal for this conversation (tagged or carried as a legacy
    /// `read:<conv>` status token) promotes to `Read`; an Online presence
    /// promotes `Sent` to `Delivered`. A read marker for a different
    /// conversation is still Online evidence, so it delivers here. A read
    /// arriving before the presence event still wins: the later Online
    /// cannot demote it.
    pub fn apply_event(&mut self, event: &PresenceEvent) {
        match event {
            PresenceEvent::Signal { user_id, signal } if *user_id == self.peer_id => {
                if let Signal::Read { conversation_id } = signal {
                    if *conversation_id == self.conversation_id {
                        self.peer_read();
                    }
                }
            }
            PresenceEvent::Presence {
                user_id,
                state,
                status_token,
            } if *user_id == self.peer_id => {
                match Signal::from_status_token(status_token) {
                    Some(Signal::Read { conversation_id })
                        if conversation_id == self.conversation_id =>
                    {
                        self.peer_read();
                    }
                    _ => {
                        if *state == PresenceState::Online {
                            self.peer_online();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Authoritative native read receipt from the chat transport.
    ///
    /// A receipt for the tracked id sets `Read` from any phase. A receipt
    /// for a different message while we hold an inferred `Read` retracts
    /// it to `Delivered`, since the transport says the peer's read marker
    /// sits elsewhere.
    pub fn apply_native_receipt(&mut self, message_id: &str, holder: &str) {
        if holder != self.peer_id {
            return;
        }
        let Some(msg) = self.tracked.as_mut() else {
            return;
        };
        if msg.id == message_id {
            msg.phase = DeliveryPhase::Read;
            self.store.set(&read_key(&self.conversation_id), &msg.id);
            self.store.remove(&delivered_key(&self.conversation_id));
        } else if msg.phase == DeliveryPhase::Read {
            msg.phase = DeliveryPhase::Delivered;
            self.store
                .set(&delivered_key(&self.conversation_id), &msg.id);
            self.store.remove(&read_key(&self.conversation_id));
        }
    }

    /// Rebuilds the tracked message from persisted markers on conversation
    /// (re)entry. A marker only applies when its id still matches a
    /// self-authored message in the reloaded history; the read marker is
    /// consulted first so it wins over a stale delivered marker.
    pub fn restore(&mut self, history: &[HistoryEntry]) {
        let candidates = [
            (read_key(&self.conversation_id), DeliveryPhase::Read),
            (delivered_key(&self.conversation_id), DeliveryPhase::Delivered),
        ];
        for (key, phase) in candidates {
            let Some(id) = self.store.get(&key) else {
                continue;
            };
            let Some(entry) = history
                .iter()
                .find(|e| e.id == id && e.author == self.self_id)
            else {
                continue;
            };
            self.tracked = Some(TrackedMessage {
                id: entry.id.clone(),
                body: entry.body.clone(),
                phase,
            });
            return;
        }
    }

    fn peer_online(&mut self) {
        if let Some(msg) = self.tracked.as_mut() {
            if msg.phase == DeliveryPhase::Sent {
                msg.phase = DeliveryPhase::Delivered;
                self.store
                    .set(&delivered_key(&self.conversation_id), &msg.id);
            }
        }
    }

    fn peer_read(&mut self) {
        if let Some(msg) = self.tracked.as_mut() {
            if matches!(msg.phase, DeliveryPhase::Sent | DeliveryPhase::Delivered) {
                msg.phase = DeliveryPhase::Read;
                self.store.set(&read_key(&self.conversation_id), &msg.id);
                self.store.remove(&delivered_key(&self.conversation_id));
            }
        }
    }
}

/// Guard for the recurring read announcement while a conversation is open.
///
/// Publishes `Signal::Read` once immediately and then on every interval
/// tick. Dropping (or calling [`stop`](Self::stop)) cancels the timer and
/// republishes the current presence state with an empty status token,
/// clearing the legacy read marker for peers that still interpret it
/// without disturbing an Idle demotion.
pub struct ReadAnnouncer {
    handle: tokio::task::JoinHandle<()>,
    client: HubClient,
}

impl ReadAnnouncer {
    /// Starts announcing that `conversation_id` is open.
    #[must_use]
    pub fn start(client: &HubClient, conversation_id: &str) -> Self {
        let interval = client.config().read_announce_interval;
        Self::start_with_interval(client, conversation_id, interval)
    }

    /// Same as [`start`](Self::start) with an explicit interval.
    #[must_use]
    pub fn start_with_interval(
        client: &HubClient,
        conversation_id: &str,
        interval: Duration,
    ) -> Self {
        let conversation_id = conversation_id.to_string();
        let announcer = client.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                announcer.send_signal(Signal::Read {
                    conversation_id: conversation_id.clone(),
                });
            }
        });
        Self {
            handle,
            client: client.clone(),
        }
    }

    /// Stops announcing. Equivalent to dropping the guard.
    pub fn stop(self) {}
}

impl Drop for ReadAnnouncer {
    fn drop(&mut self) {
        self.handle.abort();
        // Keep whatever state the user is in; only the token is cleared.
        let state = self.client.presence(self.client.user_id()).state;
        self.client.update_presence(state, "");
    }
}
