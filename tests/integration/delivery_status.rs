// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Delivery and read reconciliation driven by live hub traffic.
//!
//! These tests validate:
//! - a sent message becomes Delivered when the peer shows up Online
//! - a read announcement from the peer promotes the message to Read, in
//!   either arrival order relative to the presence event
//! - the read announcer guard publishes on an interval and clears its
//!   marker on drop
//! - persisted markers survive a conversation re-entry via `restore`

use std::sync::Arc;
use std::time::Duration;

use vigil::client::HubClient;
use vigil::config::ClientConfig;
use vigil::reconcile::{DeliveryPhase, HistoryEntry, ReadAnnouncer, Reconciler};
use vigil::status::{InMemoryStatusStore, StatusStore};
use vigil_hub::hub::{HubState, start_server_with_state};
use vigil_proto::presence::PresenceState;
use vigil_proto::signal::Signal;

async fn start_hub() -> (String, Arc<HubState>) {
    let state = Arc::new(HubState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("hub should bind an ephemeral port");
    (format!("ws://{addr}/ws"), state)
}

fn fast_config(url: &str, user_id: &str) -> ClientConfig {
    let mut config = ClientConfig::new(url, user_id);
    config.reconnect.initial_delay = Duration::from_millis(50);
    config.reconnect.max_delay = Duration::from_millis(200);
    config
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Connects both parties and returns (alice, bob) once each sees the other.
async fn connected_pair(url: &str) -> (HubClient, HubClient) {
    let alice = HubClient::spawn(fast_config(url, "alice")).unwrap();
    let bob = HubClient::spawn(fast_config(url, "bob")).unwrap();
    assert!(
        wait_until(
            || alice.presence("bob").state == PresenceState::Online
                && bob.presence("alice").state == PresenceState::Online,
            Duration::from_secs(5),
        )
        .await
    );
    (alice, bob)
}

/// Drains alice's event stream into the reconciler until the tracked
/// message reaches `target` or the timeout passes.
async fn drive_until_phase(
    events: &mut tokio::sync::broadcast::Receiver<vigil::client::PresenceEvent>,
    reconciler: &mut Reconciler<Arc<InMemoryStatusStore>>,
    target: DeliveryPhase,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                reconciler.apply_event(&event);
                if reconciler.tracked().map(|m| m.phase) == Some(target) {
                    return true;
                }
            }
            Ok(Err(_)) | Err(_) => break,
        }
    }
    reconciler.tracked().map(|m| m.phase) == Some(target)
}

#[tokio::test]
async fn message_is_delivered_when_peer_comes_online() {
    let (url, _state) = start_hub().await;

    let alice = HubClient::spawn(fast_config(&url, "alice")).unwrap();
    assert!(
        wait_until(
            || alice.presence("alice").state == PresenceState::Online,
            Duration::from_secs(5),
        )
        .await
    );

    let store = Arc::new(InMemoryStatusStore::new());
    let mut reconciler = Reconciler::new("room-1", "alice", "bob", Arc::clone(&store));
    let temp_id = reconciler.begin_send("hello");
    assert!(temp_id.starts_with("temp-"));
    reconciler.confirm_sent("evt-42");

    // Subscribe before bob joins so his Online broadcast is captured.
    let mut events = alice.subscribe();
    let bob = HubClient::spawn(fast_config(&url, "bob")).unwrap();

    assert!(drive_until_phase(&mut events, &mut reconciler, DeliveryPhase::Delivered).await);
    assert_eq!(store.get("delivered-room-1").as_deref(), Some("evt-42"));

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn peer_read_announcement_promotes_to_read() {
    let (url, _state) = start_hub().await;
    let (alice, bob) = connected_pair(&url).await;

    let store = Arc::new(InMemoryStatusStore::new());
    let mut reconciler = Reconciler::new("room-1", "alice", "bob", Arc::clone(&store));
    reconciler.begin_send("hello");
    reconciler.confirm_sent("evt-42");

    let mut events = alice.subscribe();
    bob.send_signal(Signal::Read {
        conversation_id: "room-1".into(),
    });

    assert!(drive_until_phase(&mut events, &mut reconciler, DeliveryPhase::Read).await);
    assert_eq!(store.get("read-room-1").as_deref(), Some("evt-42"));
    assert!(store.get("delivered-room-1").is_none());

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn read_wins_when_presence_arrives_afterwards() {
    let (url, _state) = start_hub().await;
    let (alice, bob) = connected_pair(&url).await;

    let store = Arc::new(InMemoryStatusStore::new());
    let mut reconciler = Reconciler::new("room-1", "alice", "bob", Arc::clone(&store));
    reconciler.begin_send("hello");
    reconciler.confirm_sent("evt-42");

    let mut events = alice.subscribe();
    // Read first, then a routine presence refresh from the same peer.
    bob.send_signal(Signal::Read {
        conversation_id: "room-1".into(),
    });
    bob.update_presence(PresenceState::Online, "online");

    assert!(drive_until_phase(&mut events, &mut reconciler, DeliveryPhase::Read).await);

    // Absorb the trailing presence event too; the phase must not regress.
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = events.try_recv() {
        reconciler.apply_event(&event);
    }
    assert_eq!(reconciler.tracked().unwrap().phase, DeliveryPhase::Read);

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn read_announcer_publishes_periodically_and_clears_on_drop() {
    let (url, _state) = start_hub().await;
    let (alice, bob) = connected_pair(&url).await;

    let mut events = alice.subscribe();
    let announcer = ReadAnnouncer::start_with_interval(&bob, "room-1", Duration::from_millis(50));

    let mut seen = 0;
    let counted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(event) = events.recv().await {
                if let vigil::client::PresenceEvent::Signal { user_id, signal } = event {
                    if user_id == "bob"
                        && signal
                            == (Signal::Read {
                                conversation_id: "room-1".into(),
                            })
                    {
                        seen += 1;
                        if seen >= 3 {
                            return;
                        }
                    }
                }
            }
        }
    })
    .await;
    assert!(counted.is_ok(), "announcer should publish repeatedly");

    announcer.stop();
    // Leaving the conversation clears the legacy token via a presence update.
    assert!(
        wait_until(
            || {
                let record = alice.presence("bob");
                record.state == PresenceState::Online && record.status_token.is_empty()
            },
            Duration::from_secs(5),
        )
        .await,
        "stopping the announcer should publish an empty status token"
    );

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn stopping_announcer_keeps_a_non_online_state() {
    let (url, _state) = start_hub().await;
    let (alice, bob) = connected_pair(&url).await;

    // Bob has self-demoted (idle) before leaving the conversation.
    bob.update_presence(PresenceState::Unavailable, "Inactive");
    assert!(
        wait_until(
            || alice.presence("bob").state == PresenceState::Unavailable,
            Duration::from_secs(5),
        )
        .await
    );

    let announcer = ReadAnnouncer::start_with_interval(&bob, "room-1", Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(120)).await;
    announcer.stop();

    // The token clears but the demoted state must survive the leave.
    assert!(
        wait_until(
            || {
                let record = alice.presence("bob");
                record.state == PresenceState::Unavailable && record.status_token.is_empty()
            },
            Duration::from_secs(5),
        )
        .await,
        "leaving a conversation must not advertise Online while demoted"
    );

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn restore_rebuilds_phase_after_conversation_reentry() {
    let store = Arc::new(InMemoryStatusStore::new());

    {
        let mut reconciler = Reconciler::new("room-1", "alice", "bob", Arc::clone(&store));
        reconciler.begin_send("hello");
        reconciler.confirm_sent("evt-42");
        reconciler.apply_native_receipt("evt-42", "bob");
    }

    // Re-entering the conversation with fresh state but the same store.
    let mut reconciler = Reconciler::new("room-1", "alice", "bob", Arc::clone(&store));
    reconciler.restore(&[
        HistoryEntry {
            id: "evt-41".into(),
            author: "bob".into(),
            body: "hi".into(),
        },
        HistoryEntry {
            id: "evt-42".into(),
            author: "alice".into(),
            body: "hello".into(),
        },
    ]);

    let msg = reconciler.tracked().expect("marker should be restored");
    assert_eq!(msg.id, "evt-42");
    assert_eq!(msg.phase, DeliveryPhase::Read);
}
