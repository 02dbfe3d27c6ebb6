use std::sync::Arc;

use vipspin::{
    AppState, Config, MemoryStore, Store,
    models::{ClientEvent, MatchPreferences, ServerEvent, User},
    services::SessionHandle,
};

fn drain(handle: &mut SessionHandle) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = handle.events.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn matched_pair_chats_and_gifts_over_the_hub() {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), Config::for_secrets("jwt", "pay"));

    let alice = User::new("alice");
    let mut bob = User::new("bob");
    bob.gift_credits = 12;
    store.insert_user(&alice).await.unwrap();
    store.insert_user(&bob).await.unwrap();

    let outcome = state.matching.spin(alice.id, MatchPreferences::default()).await.unwrap();
    assert_eq!(outcome.candidate.id, bob.id);
    state.matching.accept(bob.id, outcome.proposal.id).await.unwrap();

    let mut alice_session = state.hub.connect(alice.id).await;
    let mut bob_session = state.hub.connect(bob.id).await;
    assert!(matches!(
        drain(&mut alice_session).as_slice(),
        [ServerEvent::Connected { .. }, ServerEvent::ConnectionOnline { user_id, .. }] if *user_id == bob.id
    ));
    drain(&mut bob_session);

    state
        .hub
        .dispatch(
            alice.id,
            ClientEvent::SendMessage {
                receiver_id: bob.id,
                body: "hey!".into(),
                kind: None,
            },
        )
        .await;
    state
        .hub
        .dispatch(
            bob.id,
            ClientEvent::SendGift {
                receiver_id: alice.id,
                gift_kind: "crown".into(),
                message: None,
            },
        )
        .await;
    state
        .hub
        .dispatch(
            bob.id,
            ClientEvent::SendGift {
                receiver_id: alice.id,
                gift_kind: "crown".into(),
                message: None,
            },
        )
        .await;

    let to_bob = drain(&mut bob_session);
    assert!(matches!(to_bob[0], ServerEvent::NewMessage { .. }));
    assert!(matches!(to_bob[1], ServerEvent::GiftSent { credits_remaining: Some(2), .. }));
    assert!(matches!(&to_bob[2], ServerEvent::Error { code, .. } if code == "insufficient_credits"));

    let to_alice = drain(&mut alice_session);
    assert!(matches!(to_alice[0], ServerEvent::MessageSent { .. }));
    assert!(matches!(to_alice[1], ServerEvent::GiftReceived { .. }));
    assert_eq!(to_alice.len(), 2);

    let connections = state.matching.list_connections(alice.id).await.unwrap();
    assert_eq!(connections[0].message_count, 1);
    assert_eq!(connections[0].gift_count, 1);
    assert_eq!(store.get_user(bob.id).await.unwrap().unwrap().gift_credits, 2);

    state.hub.disconnect(bob.id, bob_session.session_id).await;
    assert!(matches!(
        drain(&mut alice_session).as_slice(),
        [ServerEvent::ConnectionOffline { user_id, .. }] if *user_id == bob.id
    ));
}
