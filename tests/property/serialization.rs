//! Property-based serialization round-trip tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `ClientFrame` survives encode → decode round-trip.
//! 2. Any valid `HubFrame` survives encode → decode round-trip.
//! 3. Random bytes never cause a panic in either decoder (they return
//!    `Err` gracefully).
//! 4. The legacy `read:<conv>` status-token encoding round-trips through
//!    the tagged signal representation.

use proptest::prelude::*;
use vigil_proto::presence::PresenceState;
use vigil_proto::signal::Signal;
use vigil_proto::wire::{self, ClientFrame, HubFrame};

// --- Strategies for protocol types ---

/// Strategy for generating arbitrary `PresenceState` values.
fn arb_state() -> impl Strategy<Value = PresenceState> {
    prop_oneof![
        Just(PresenceState::Online),
        Just(PresenceState::Offline),
        Just(PresenceState::Unavailable),
    ]
}

/// Strategy for user and conversation identifiers.
fn arb_id() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:._@-]{1,64}"
}

/// Strategy for free-form status tokens, including empty ones.
fn arb_status_token() -> impl Strategy<Value = String> {
    "[^\x00]{0,128}"
}

/// Strategy for generating arbitrary `Signal` values.
fn arb_signal() -> impl Strategy<Value = Signal> {
    prop_oneof![
        arb_id().prop_map(|conversation_id| Signal::Read { conversation_id }),
        (arb_id(), any::<bool>()).prop_map(|(conversation_id, is_typing)| Signal::Typing {
            conversation_id,
            is_typing
        }),
    ]
}

/// Strategy for generating arbitrary `ClientFrame` values.
fn arb_client_frame() -> impl Strategy<Value = ClientFrame> {
    prop_oneof![
        (arb_state(), arb_status_token())
            .prop_map(|(state, status_token)| ClientFrame::Presence {
                state,
                status_token
            }),
        arb_signal().prop_map(ClientFrame::Signal),
    ]
}

/// Strategy for generating arbitrary `HubFrame` values.
fn arb_hub_frame() -> impl Strategy<Value = HubFrame> {
    prop_oneof![
        (arb_id(), arb_state(), arb_status_token()).prop_map(
            |(user_id, state, status_token)| HubFrame::Presence {
                user_id,
                state,
                status_token
            }
        ),
        (arb_id(), arb_signal()).prop_map(|(user_id, signal)| HubFrame::Signal {
            user_id,
            signal
        }),
    ]
}

proptest! {
    #[test]
    fn client_frame_round_trips(frame in arb_client_frame()) {
        let bytes = wire::encode_client(&frame).expect("encode should succeed");
        let decoded = wire::decode_client(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    #[test]
    fn hub_frame_round_trips(frame in arb_hub_frame()) {
        let bytes = wire::encode_hub(&frame).expect("encode should succeed");
        let decoded = wire::decode_hub(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    #[test]
    fn random_bytes_never_panic_the_decoders(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // Either outcome is fine; the property is "no panic".
        let _ = wire::decode_client(&bytes);
        let _ = wire::decode_hub(&bytes);
    }

    #[test]
    fn legacy_read_token_round_trips(conversation_id in "[a-zA-Z0-9:._@-]{1,64}") {
        let signal = Signal::Read { conversation_id };
        let token = signal.to_status_token().expect("read signals have a token form");
        let parsed = Signal::from_status_token(&token).expect("token should parse back");
        prop_assert_eq!(signal, parsed);
    }
}
