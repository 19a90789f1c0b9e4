//! Hub server core: shared state, WebSocket handler, connection registry,
//! and broadcast fan-out.
//!
//! The hub accepts WebSocket connections, binds each to a user identity
//! supplied as a `user_id` query parameter, keeps the authoritative
//! [`PresenceStore`], and fans every durable change out to all connected
//! clients. Ephemeral signals are relayed with the sender's identity
//! attached but never stored.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};
use vigil_proto::presence::PresenceState;
use vigil_proto::wire::{self, CLOSE_MISSING_USER_ID, ClientFrame, HubFrame};

use crate::store::PresenceStore;

/// Default maximum allowed frame size in bytes (16 KB).
///
/// Presence frames are tiny; anything near this limit is garbage.
const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// Shared hub state holding the connection registry and presence store.
pub struct HubState {
    /// Maps user id to a channel sender for delivering WebSocket messages.
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Authoritative presence records, mutated only by the hub.
    pub store: PresenceStore,
    /// Maximum allowed inbound frame size in bytes.
    max_frame_size: usize,
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

impl HubState {
    /// Creates a new hub state with an empty registry and store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            store: PresenceStore::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Creates a new hub state with a custom frame size limit.
    #[must_use]
    pub fn with_config(max_frame_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            store: PresenceStore::new(),
            max_frame_size,
        }
    }

    /// Registers a connection, storing the sender half of its message channel.
    ///
    /// If the user was already connected, the old sender is replaced and the
    /// previous writer task will observe its channel closing and shut down.
    pub async fn register(
        &self,
        user_id: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.insert(user_id.to_string(), sender)
    }

    /// Removes a connection, but only if `sender` is still the registered one.
    ///
    /// A disconnecting socket that has already been replaced by a newer
    /// connection for the same user must not clobber its successor. Returns
    /// `true` if the registration was removed.
    pub async fn unregister_if_current(
        &self,
        user_id: &str,
        sender: &mpsc::UnboundedSender<Message>,
    ) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get(user_id) {
            Some(current) if current.same_channel(sender) => {
                conns.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Encodes a frame and sends it to every connected client.
    ///
    /// Fan-out is sequential best-effort: a failed send to one peer (closed
    /// socket) is logged and skipped, never aborting delivery to the rest.
    /// The dead peer is reaped by its own close handling.
    pub async fn broadcast(&self, frame: &HubFrame) {
        let bytes = match wire::encode_hub(frame) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode broadcast frame");
                return;
            }
        };
        let conns = self.connections.read().await;
        for (user_id, sender) in conns.iter() {
            if sender.send(Message::Binary(bytes.clone().into())).is_err() {
                tracing::warn!(user_id = %user_id, "broadcast send failed, peer will be reaped on close");
            }
        }
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Triggers each client's disconnect handling. Useful for graceful
    /// shutdown and for exercising client reconnection in tests.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (user_id, sender) in conns.iter() {
            tracing::info!(user_id = %user_id, "sending close frame");
            let _ = sender.send(Message::Close(None));
        }
    }

    /// Returns the number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

/// Handles an upgraded WebSocket connection for a single user.
///
/// Lifecycle:
/// 1. Register the connection (replacing any duplicate for the same user).
/// 2. Set the user Online in the store and broadcast the change to all
///    connections, the new one included.
/// 3. Queue a snapshot of every other user's record for the new connection
///    so the late joiner starts consistent.
/// 4. Enter the dispatch loop, applying presence updates and relaying
///    signals.
/// 5. On disconnect, set the user Offline and broadcast it — unless a newer
///    connection for the same user has taken over.
pub async fn handle_socket(socket: WebSocket, user_id: String, state: Arc<HubState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    tracing::info!(user_id = %user_id, "client connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    if state.register(&user_id, tx.clone()).await.is_some() {
        tracing::info!(user_id = %user_id, "replaced existing connection (duplicate identity)");
    }

    // Online-on-connect, broadcast before the snapshot so every client
    // (including this one) sees the transition in arrival order.
    state.store.set(&user_id, PresenceState::Online, "online").await;
    state
        .broadcast(&HubFrame::Presence {
            user_id: user_id.clone(),
            state: PresenceState::Online,
            status_token: "online".to_string(),
        })
        .await;

    // Snapshot of everyone else, one frame per user, self excluded.
    for record in state.store.snapshot_except(&user_id).await {
        let frame = HubFrame::Presence {
            user_id: record.user_id,
            state: record.state,
            status_token: record.status_token,
        };
        match wire::encode_hub(&frame) {
            Ok(bytes) => {
                if tx.send(Message::Binary(bytes.into())).is_err() {
                    break;
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode snapshot frame"),
        }
    }

    // Writer task: forward queued messages to the WebSocket.
    let writer_user_id = user_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(user_id = %writer_user_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: one inbound frame is fully processed before the next.
    let reader_user_id = user_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_frame(&reader_user_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(user_id = %reader_user_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Offline-on-disconnect, exactly once per identity, and only if this
    // socket still owns the registration.
    if state.unregister_if_current(&user_id, &tx).await {
        state.store.set(&user_id, PresenceState::Offline, "").await;
        state
            .broadcast(&HubFrame::Presence {
                user_id: user_id.clone(),
                state: PresenceState::Offline,
                status_token: String::new(),
            })
            .await;
        tracing::info!(user_id = %user_id, "client disconnected, broadcast offline");
    } else {
        tracing::debug!(user_id = %user_id, "stale connection closed, registration already replaced");
    }
}

/// Handles one binary frame from a bound connection.
///
/// Malformed or oversized frames are logged and dropped; one bad message
/// never takes down the dispatch loop.
async fn handle_frame(user_id: &str, data: &[u8], state: &Arc<HubState>) {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            user_id = %user_id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit, dropped"
        );
        return;
    }

    let frame = match wire::decode_client(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "malformed frame, dropped");
            return;
        }
    };

    match frame {
        ClientFrame::Presence {
            state: presence,
            status_token,
        } => {
            state.store.set(user_id, presence, &status_token).await;
            tracing::debug!(user_id = %user_id, state = %presence, "presence updated");
            state
                .broadcast(&HubFrame::Presence {
                    user_id: user_id.to_string(),
                    state: presence,
                    status_token,
                })
                .await;
        }
        ClientFrame::Signal(signal) => {
            // Relayed verbatim with the sender attached; never stored.
            tracing::debug!(user_id = %user_id, signal = ?signal, "relaying signal");
            state
                .broadcast(&HubFrame::Signal {
                    user_id: user_id.to_string(),
                    signal,
                })
                .await;
        }
    }
}

/// Starts the hub server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub server with a pre-configured [`HubState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Handshake query parameters.
#[derive(Debug, serde::Deserialize)]
struct ConnectParams {
    user_id: Option<String>,
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
///
/// Connections without a non-empty `user_id` query parameter are upgraded
/// and immediately closed with [`CLOSE_MISSING_USER_ID`] so the rejection
/// is distinguishable from a transport failure.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::Query(params): axum::extract::Query<ConnectParams>,
    axum::extract::State(state): axum::extract::State<Arc<HubState>>,
) -> impl axum::response::IntoResponse {
    match params.user_id.filter(|id| !id.is_empty()) {
        Some(user_id) => ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)),
        None => ws.on_upgrade(reject_missing_user_id),
    }
}

/// Closes a connection that arrived without a user identity.
async fn reject_missing_user_id(mut socket: WebSocket) {
    tracing::warn!("connection rejected: missing user_id");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_MISSING_USER_ID,
            reason: "missing user_id".into(),
        })))
        .await;
}
