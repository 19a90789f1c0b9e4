//! Hub client: one WebSocket connection per application instance, a local
//! presence cache, and the idle-detection timer.
//!
//! The client is a cheap cloneable handle over shared state. A supervisor
//! task owns an explicit reconnect state machine
//! (`Disconnected → Connecting → Connected`) with exponential backoff and
//! retries indefinitely until [`HubClient::shutdown`]. Cache reads never
//! block; publishes are fire-and-forget and silently dropped while
//! disconnected.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use vigil_proto::presence::{PresenceRecord, PresenceState};
use vigil_proto::signal::Signal;
use vigil_proto::wire::{self, ClientFrame};

use crate::cache::PresenceCache;
use crate::config::ClientConfig;
use crate::idle::IdleDetector;

/// Type alias for a client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection state of the hub link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No connection; the supervisor is waiting out the backoff delay.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The WebSocket is open and bound to the local identity.
    Connected,
}

/// An event received from the hub, delivered raw to subscribers so
/// conversation-scoped consumers can filter by sender themselves.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// A durable presence change for some user.
    Presence {
        /// The user whose presence changed.
        user_id: String,
        /// The new availability state.
        state: PresenceState,
        /// Free-form status text (may carry a legacy read marker).
        status_token: String,
    },
    /// An ephemeral signal relayed by the hub.
    Signal {
        /// The user who sent the signal.
        user_id: String,
        /// The relayed signal.
        signal: Signal,
    },
}

/// Errors from constructing a [`HubClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No user identity was available from the identity provider.
    #[error("no user identity available")]
    MissingIdentity,

    /// The configured hub URL could not be parsed.
    #[error("invalid hub url {url}: {source}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}

/// Shared state behind every [`HubClient`] handle.
struct ClientInner {
    config: ClientConfig,
    /// Hub URL with the `user_id` query parameter already attached.
    connect_url: String,
    cache: PresenceCache,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    events: broadcast::Sender<PresenceEvent>,
    conn_state: watch::Sender<ConnState>,
    idle: Mutex<IdleDetector>,
    shutdown: watch::Sender<bool>,
}

impl ClientInner {
    fn set_conn(&self, state: ConnState) {
        self.conn_state.send_replace(state);
    }

    fn is_connected(&self) -> bool {
        *self.conn_state.borrow() == ConnState::Connected
    }

    /// Queues a presence publish; a no-op while disconnected so transient
    /// outages never crash callers.
    fn publish_presence(&self, state: PresenceState, status_token: &str) {
        if !self.is_connected() {
            tracing::debug!(state = %state, "not connected, presence publish skipped");
            return;
        }
        self.cache.insert(&self.config.user_id, state, status_token);
        let _ = self.outbound.send(ClientFrame::Presence {
            state,
            status_token: status_token.to_string(),
        });
    }

    fn publish_signal(&self, signal: Signal) {
        if !self.is_connected() {
            tracing::debug!(signal = ?signal, "not connected, signal dropped");
            return;
        }
        let _ = self.outbound.send(ClientFrame::Signal(signal));
    }

    /// Merges one inbound hub frame into the cache and notifies
    /// subscribers. Malformed frames are logged and dropped.
    fn handle_hub_frame(&self, data: &[u8]) {
        match wire::decode_hub(data) {
            Ok(wire::HubFrame::Presence {
                user_id,
                state,
                status_token,
            }) => {
                self.cache.insert(&user_id, state, &status_token);
                let _ = self.events.send(PresenceEvent::Presence {
                    user_id,
                    state,
                    status_token,
                });
            }
            Ok(wire::HubFrame::Signal { user_id, signal }) => {
                let _ = self.events.send(PresenceEvent::Signal { user_id, signal });
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed hub frame, skipping");
            }
        }
    }
}

/// Handle to the presence client. Clones share the same connection,
/// cache, and timers.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

impl HubClient {
    /// Starts the client: validates the identity, spawns the connection
    /// supervisor and the recurring idle check, then returns immediately.
    ///
    /// The supervisor keeps retrying in the background; a hub that is down
    /// at spawn time is not an error, just a `Disconnected` state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingIdentity`] if `config.user_id` is
    /// empty, or [`ClientError::InvalidUrl`] if the hub URL is unparseable.
    pub fn spawn(config: ClientConfig) -> Result<Self, ClientError> {
        if config.user_id.is_empty() {
            return Err(ClientError::MissingIdentity);
        }
        let mut url =
            url::Url::parse(&config.hub_url).map_err(|source| ClientError::InvalidUrl {
                url: config.hub_url.clone(),
                source,
            })?;
        url.query_pairs_mut().append_pair("user_id", &config.user_id);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(config.event_buffer);
        let (conn_tx, _) = watch::channel(ConnState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let idle = Mutex::new(IdleDetector::new(config.idle.threshold, Instant::now()));

        let inner = Arc::new(ClientInner {
            connect_url: url.to_string(),
            cache: PresenceCache::new(),
            outbound: outbound_tx,
            events: events_tx,
            conn_state: conn_tx,
            idle,
            shutdown: shutdown_tx,
            config,
        });

        tokio::spawn(supervise(
            Arc::clone(&inner),
            outbound_rx,
            shutdown_rx.clone(),
        ));
        tokio::spawn(idle_loop(Arc::clone(&inner), shutdown_rx));

        Ok(Self { inner })
    }

    /// The local user identity bound to the connection.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.inner.config.user_id
    }

    /// The resolved client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    #[must_use]
    pub fn conn_state(&self) -> ConnState {
        *self.inner.conn_state.borrow()
    }

    /// A watch receiver for observing connection state transitions.
    #[must_use]
    pub fn watch_conn_state(&self) -> watch::Receiver<ConnState> {
        self.inner.conn_state.subscribe()
    }

    /// Subscribes to raw presence and signal events from the hub.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the cached presence record for a user, defaulting to
    /// Offline for unseen users. Never blocks, never errors.
    #[must_use]
    pub fn presence(&self, user_id: &str) -> PresenceRecord {
        self.inner.cache.get(user_id)
    }

    /// Publishes a presence update for the local user. Fire-and-forget:
    /// a silent no-op while the connection is down.
    pub fn update_presence(&self, state: PresenceState, status_token: &str) {
        self.inner.publish_presence(state, status_token);
    }

    /// Publishes an ephemeral signal. Same no-op semantics as
    /// [`update_presence`](Self::update_presence).
    pub fn send_signal(&self, signal: Signal) {
        self.inner.publish_signal(signal);
    }

    /// Records a user-interaction signal (pointer move, key press, click).
    ///
    /// Only an Idle→Active transition publishes Online; steady-state
    /// activity is absorbed by the detector.
    pub fn note_activity(&self) {
        let transitioned = self.inner.idle.lock().record_activity(Instant::now());
        if transitioned {
            self.inner.publish_presence(PresenceState::Online, "online");
        }
    }

    /// Tears down the supervisor, timers, and socket. The hub observes the
    /// close and broadcasts Offline on our behalf; no goodbye message is
    /// sent.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }
}

/// Connection supervisor: the reconnect state machine.
///
/// `Disconnected → Connecting → Connected`, with exponential backoff
/// between attempts (doubling from `initial_delay` up to `max_delay`,
/// reset after a successful connect). On every successful connect the
/// client republishes Online, covering both the initial handshake and the
/// self-healing republish after an outage.
async fn supervise(
    inner: Arc<ClientInner>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut delay = inner.config.reconnect.initial_delay;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        inner.set_conn(ConnState::Connecting);

        match connect_async(&inner.connect_url).await {
            Ok((ws, _response)) => {
                tracing::info!(user_id = %inner.config.user_id, "connected to presence hub");
                inner.set_conn(ConnState::Connected);
                delay = inner.config.reconnect.initial_delay;

                inner.publish_presence(PresenceState::Online, "online");
                run_connection(&inner, ws, &mut outbound_rx, &mut shutdown_rx).await;

                inner.set_conn(ConnState::Disconnected);
                // Frames queued while the link was dying are stale; the
                // Online republish on reconnect supersedes them.
                while outbound_rx.try_recv().is_ok() {}
            }
            Err(e) => {
                tracing::warn!(error = %e, "hub connection failed");
                inner.set_conn(ConnState::Disconnected);
            }
        }

        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
        delay = delay.saturating_mul(2).min(inner.config.reconnect.max_delay);
    }

    inner.set_conn(ConnState::Disconnected);
    tracing::info!("hub client supervisor exiting");
}

/// Drives one live connection until it closes or shutdown is requested.
async fn run_connection(
    inner: &Arc<ClientInner>,
    ws: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                match wire::encode_client(&frame) {
                    Ok(bytes) => {
                        if sink.send(Message::Binary(bytes.into())).await.is_err() {
                            tracing::warn!("hub send failed, dropping connection");
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to encode outbound frame"),
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => inner.handle_hub_frame(&data),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "hub closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore text, ping, pong frames.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "hub read error");
                        break;
                    }
                    None => break,
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}

/// Recurring idle check: one tick per `check_interval`.
///
/// Feeds the cached self-presence into the detector so the Unavailable
/// demotion fires exactly once per transition, and a diverged self-state
/// is healed back to Online within one interval.
async fn idle_loop(inner: Arc<ClientInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(inner.config.idle.check_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so a fresh client does not
    // publish before the connection settles.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }

        let self_state = inner.cache.get(&inner.config.user_id).state;
        let decision = inner.idle.lock().poll(Instant::now(), self_state);
        match decision {
            Some(PresenceState::Unavailable) => {
                tracing::info!("idle threshold exceeded, demoting to unavailable");
                inner.publish_presence(PresenceState::Unavailable, "Inactive");
            }
            Some(state) => {
                tracing::debug!(state = %state, "reaffirming presence");
                inner.publish_presence(state, "online");
            }
            None => {}
        }
    }
}
