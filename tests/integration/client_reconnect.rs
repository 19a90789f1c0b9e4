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

//! Reconnect behavior of the hub client.
//!
//! These tests validate:
//! - the supervisor reconnects automatically after the hub drops the socket
//! - Online is republished after a reconnect without caller involvement
//! - publishes during an outage are silent no-ops and are not replayed
//! - a client spawned against a dead address keeps retrying until the hub
//!   appears
//!
//! ## Disconnect simulation
//!
//! The hub exposes `close_all_connections` for tests; closing the per-peer
//! sender channels makes each connection's writer task exit, which closes
//! the socket under the client.

use std::sync::Arc;
use std::time::Duration;

use vigil::client::{ConnState, HubClient};
use vigil::config::ClientConfig;
use vigil_hub::hub::{HubState, start_server_with_state};
use vigil_proto::presence::PresenceState;

async fn start_hub_on(addr: &str) -> (String, Arc<HubState>) {
    let state = Arc::new(HubState::new());
    let (bound, _handle) = start_server_with_state(addr, Arc::clone(&state))
        .await
        .expect("hub should bind");
    (format!("ws://{bound}/ws"), state)
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

#[tokio::test]
async fn client_reconnects_after_hub_drops_the_socket() {
    let (url, state) = start_hub_on("127.0.0.1:0").await;

    let alice = HubClient::spawn(fast_config(&url, "alice")).unwrap();
    assert!(
        wait_until(
            || alice.conn_state() == ConnState::Connected,
            Duration::from_secs(5),
        )
        .await
    );

    let mut conn_watch = alice.watch_conn_state();
    state.close_all_connections().await;

    // Must pass through a non-connected state before coming back.
    let saw_drop = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            conn_watch.changed().await.expect("watch should stay open");
            if *conn_watch.borrow() != ConnState::Connected {
                return;
            }
        }
    })
    .await;
    assert!(saw_drop.is_ok(), "client should notice the dropped socket");

    assert!(
        wait_until(
            || alice.conn_state() == ConnState::Connected,
            Duration::from_secs(5),
        )
        .await,
        "client should reconnect on its own"
    );

    alice.shutdown();
}

#[tokio::test]
async fn online_is_republished_after_reconnect() {
    let (url, state) = start_hub_on("127.0.0.1:0").await;

    let alice = HubClient::spawn(fast_config(&url, "alice")).unwrap();
    let bob = HubClient::spawn(fast_config(&url, "bob")).unwrap();
    assert!(
        wait_until(
            || bob.presence("alice").state == PresenceState::Online,
            Duration::from_secs(5),
        )
        .await
    );

    let before = bob.presence("alice").last_changed_at;
    state.close_all_connections().await;

    // Both clients reconnect; each republishes Online, so bob's view of
    // alice is refreshed with a newer change timestamp.
    assert!(
        wait_until(
            || {
                let record = bob.presence("alice");
                record.state == PresenceState::Online && record.last_changed_at >= before
            },
            Duration::from_secs(5),
        )
        .await,
        "alice should be Online again after both sides reconnect"
    );
    assert_eq!(state.store.get("alice").await.state, PresenceState::Online);

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn publishes_during_outage_are_dropped_not_queued() {
    let (url, state) = start_hub_on("127.0.0.1:0").await;

    let alice = HubClient::spawn(fast_config(&url, "alice")).unwrap();
    let bob = HubClient::spawn(fast_config(&url, "bob")).unwrap();
    assert!(
        wait_until(
            || bob.presence("alice").state == PresenceState::Online,
            Duration::from_secs(5),
        )
        .await
    );

    state.close_all_connections().await;
    assert!(
        wait_until(
            || alice.conn_state() != ConnState::Connected,
            Duration::from_secs(5),
        )
        .await
    );

    // Published while disconnected; must be dropped, not replayed later.
    alice.update_presence(PresenceState::Unavailable, "Inactive");

    assert!(
        wait_until(
            || alice.conn_state() == ConnState::Connected,
            Duration::from_secs(5),
        )
        .await
    );
    assert!(
        wait_until(
            || bob.presence("alice").state == PresenceState::Online,
            Duration::from_secs(5),
        )
        .await,
        "the reconnect republish is Online, not the stale Unavailable"
    );
    // Give any wrongly-queued frame a chance to surface.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(bob.presence("alice").state, PresenceState::Online);

    alice.shutdown();
    bob.shutdown();
}

#[tokio::test]
async fn client_keeps_retrying_until_hub_appears() {
    // Reserve a port, then release it so the client's first attempts fail.
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let url = format!("ws://{addr}/ws");
    let alice = HubClient::spawn(fast_config(&url, "alice")).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_ne!(alice.conn_state(), ConnState::Connected);

    let (_url, _state) = start_hub_on(&addr.to_string()).await;

    assert!(
        wait_until(
            || alice.conn_state() == ConnState::Connected,
            Duration::from_secs(5),
        )
        .await,
        "client should connect once the hub starts listening"
    );

    alice.shutdown();
}
