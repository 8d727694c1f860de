//! Property-based serialization round-trip tests for the store wire
//! protocol.
//!
//! Uses proptest to verify:
//! 1. Any valid `ClientRequest` survives encode → decode round-trip.
//! 2. Any valid `ServerReply` survives encode → decode round-trip.
//! 3. Random bytes never cause a panic in decode (returns `Err` gracefully).

use proptest::prelude::*;
use uuid::Uuid;

use driftchat_store::codec;
use driftchat_store::event::ChangeEvent;
use driftchat_store::message::{
    Message, MessageDraft, MessageId, Recipient, Timestamp, User, Username,
};
use driftchat_store::wire::{ClientRequest, ServerReply};

// --- Strategies for protocol types ---

/// Strategy for generating valid `Username` values.
fn arb_username() -> impl Strategy<Value = Username> {
    "[a-z0-9_-]{1,16}".prop_filter_map("reserved name", |s| Username::parse(&s).ok())
}

/// Strategy for generating arbitrary `MessageId` values.
fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u128>().prop_map(|n| MessageId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `Timestamp` values.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

/// Strategy for generating arbitrary `Recipient` values.
fn arb_recipient() -> impl Strategy<Value = Recipient> {
    prop_oneof![
        Just(Recipient::Room),
        arb_username().prop_map(Recipient::User),
    ]
}

/// Strategy for message bodies. Non-empty to keep drafts valid.
fn arb_body() -> impl Strategy<Value = String> {
    "[^\\x00]{1,256}"
}

/// Strategy for generating `MessageDraft` values.
fn arb_draft() -> impl Strategy<Value = MessageDraft> {
    (arb_username(), arb_recipient(), arb_body()).prop_map(|(sender, recipient, body)| {
        MessageDraft {
            sender,
            recipient,
            body,
        }
    })
}

/// Strategy for generating stored `Message` values.
fn arb_message() -> impl Strategy<Value = Message> {
    (arb_message_id(), arb_draft(), arb_timestamp()).prop_map(|(id, draft, timestamp)| Message {
        id,
        sender: draft.sender,
        recipient: draft.recipient,
        body: draft.body,
        timestamp,
    })
}

/// Strategy for generating `User` values.
fn arb_user() -> impl Strategy<Value = User> {
    (arb_username(), arb_timestamp()).prop_map(|(username, created_at)| User {
        username,
        created_at,
    })
}

/// Strategy for generating `ChangeEvent` values.
fn arb_change_event() -> impl Strategy<Value = ChangeEvent> {
    prop_oneof![
        arb_message().prop_map(ChangeEvent::Inserted),
        arb_message_id().prop_map(ChangeEvent::Deleted),
    ]
}

/// Strategy for generating `ClientRequest` values.
fn arb_request() -> impl Strategy<Value = ClientRequest> {
    prop_oneof![
        Just(ClientRequest::EnsureSchema),
        arb_username().prop_map(|username| ClientRequest::CreateUser { username }),
        arb_draft().prop_map(|draft| ClientRequest::Insert { draft }),
        arb_username().prop_map(|viewer| ClientRequest::QueryVisible { viewer }),
        Just(ClientRequest::Subscribe),
    ]
}

/// Strategy for generating `ServerReply` values.
fn arb_reply() -> impl Strategy<Value = ServerReply> {
    prop_oneof![
        Just(ServerReply::SchemaReady),
        arb_user().prop_map(|user| ServerReply::UserCreated { user }),
        arb_username().prop_map(|username| ServerReply::DuplicateUser { username }),
        arb_message().prop_map(|message| ServerReply::Inserted { message }),
        prop::collection::vec(arb_message(), 0..8)
            .prop_map(|messages| ServerReply::Messages { messages }),
        Just(ServerReply::Subscribed),
        arb_change_event().prop_map(|event| ServerReply::Change { event }),
        "[^\\x00]{0,64}".prop_map(|reason| ServerReply::Error { reason }),
    ]
}

proptest! {
    #[test]
    fn request_round_trips(request in arb_request()) {
        let bytes = codec::encode_request(&request).unwrap();
        let decoded = codec::decode_request(&bytes).unwrap();
        prop_assert_eq!(request, decoded);
    }

    #[test]
    fn reply_round_trips(reply in arb_reply()) {
        let bytes = codec::encode_reply(&reply).unwrap();
        let decoded = codec::decode_reply(&bytes).unwrap();
        prop_assert_eq!(reply, decoded);
    }

    #[test]
    fn random_bytes_never_panic_request_decode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // Must not panic; any result is acceptable.
        let _ = codec::decode_request(&bytes);
    }

    #[test]
    fn random_bytes_never_panic_reply_decode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_reply(&bytes);
    }

    #[test]
    fn visibility_rule_holds_for_any_message(message in arb_message(), viewer in arb_username()) {
        let visible = message.is_visible_to(&viewer);
        match &message.recipient {
            Recipient::Room => prop_assert!(visible),
            Recipient::User(name) => prop_assert_eq!(visible, *name == viewer),
        }
    }
}
