//! Typing indicator management: local publishing and remote tracking.
//!
//! Both halves are pure state machines with an injected clock; the owning
//! view drives them from keystrokes and a periodic tick and sends any
//! returned [`Signal`] through the hub client.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use vigil_proto::signal::Signal;

use crate::config::TypingConfig;

/// Local side: decides when to publish typing started/stopped for one
/// conversation.
///
/// The first keystroke publishes immediately; repeats within the coalescing
/// window are suppressed to avoid flooding. A quiet period without
/// keystrokes publishes "stopped", as does an explicit [`stop`](Self::stop)
/// on send or leave.
#[derive(Debug)]
pub struct TypingPublisher {
    conversation_id: String,
    coalesce_window: Duration,
    quiet_period: Duration,
    typing: bool,
    last_publish: Option<Instant>,
    last_keystroke: Option<Instant>,
}

impl TypingPublisher {
    /// Creates a publisher for one conversation.
    #[must_use]
    pub const fn new(conversation_id: String, config: TypingConfig) -> Self {
        Self {
            conversation_id,
            coalesce_window: config.coalesce_window,
            quiet_period: config.quiet_period,
            typing: false,
            last_publish: None,
            last_keystroke: None,
        }
    }

    /// Records a local keystroke.
    ///
    /// Returns a "typing started" signal on the first keystroke, on a fresh
    /// start after a stop, or when the coalescing window has elapsed since
    /// the last publish. Otherwise returns `None`.
    pub fn keystroke(&mut self, now: Instant) -> Option<Signal> {
        self.last_keystroke = Some(now);
        let refresh_due = self
            .last_publish
            .is_none_or(|at| now.duration_since(at) >= self.coalesce_window);
        if self.typing && !refresh_due {
            return None;
        }
        self.typing = true;
        self.last_publish = Some(now);
        Some(self.signal(true))
    }

    /// Periodic tick: publishes "typing stopped" once the quiet period has
    /// passed without a keystroke.
    pub fn poll(&mut self, now: Instant) -> Option<Signal> {
        if !self.typing {
            return None;
        }
        let quiet = self
            .last_keystroke
            .is_none_or(|at| now.duration_since(at) >= self.quiet_period);
        if quiet {
            self.typing = false;
            return Some(self.signal(false));
        }
        None
    }

    /// Immediate stop, regardless of timers — on sending a message or
    /// leaving the conversation.
    pub fn stop(&mut self) -> Option<Signal> {
        if !self.typing {
            return None;
        }
        self.typing = false;
        Some(self.signal(false))
    }

    fn signal(&self, is_typing: bool) -> Signal {
        Signal::Typing {
            conversation_id: self.conversation_id.clone(),
            is_typing,
        }
    }
}

/// Remote side: per-conversation "peer is typing" booleans with self-expiry.
///
/// A received typing signal stays valid for a fixed window and then expires
/// on its own, so a lost "stopped" signal cannot leave the indicator stuck.
#[derive(Debug)]
pub struct TypingTracker {
    expiry: Duration,
    deadlines: HashMap<(String, String), Instant>,
}

impl TypingTracker {
    /// Creates a tracker whose entries expire after `expiry`.
    #[must_use]
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            deadlines: HashMap::new(),
        }
    }

    /// Records a typing signal from a peer.
    pub fn observe(&mut self, conversation_id: &str, peer_id: &str, is_typing: bool, now: Instant) {
        let key = (conversation_id.to_string(), peer_id.to_string());
        if is_typing {
            self.deadlines.insert(key, now + self.expiry);
        } else {
            self.deadlines.remove(&key);
        }
    }

    /// Whether a peer is currently typing in a conversation, applying
    /// expiry against `now`.
    #[must_use]
    pub fn is_typing(&self, conversation_id: &str, peer_id: &str, now: Instant) -> bool {
        self.deadlines
            .get(&(conversation_id.to_string(), peer_id.to_string()))
            .is_some_and(|deadline| now < *deadline)
    }

    /// Drops expired entries.
    pub fn sweep(&mut self, now: Instant) {
        self.deadlines.retain(|_, deadline| now < *deadline);
    }
}
