//! Per-user realtime channels and the event routing between them.
//!
//! Each authenticated user owns at most one session: an unbounded queue that
//! the socket writer task drains. Routing an event is a non-blocking push onto
//! the receiver's queue; nothing is retried or buffered for absent users.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{Rng, distr::Alphanumeric};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ledger::EntitlementLedger, presence::PresenceTracker};
use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{
        ClientEvent, DeliveryStatus, GiftEvent, GiftKind, Interaction, Pair, ServerEvent, SignalKind,
        StoredMessage,
    },
};

const DEFAULT_MESSAGE_KIND: &str = "text";

struct Session {
    id: Uuid,
    tx: UnboundedSender<ServerEvent>,
}

/// The receiving half of a registered session.
pub struct SessionHandle {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub events: UnboundedReceiver<ServerEvent>,
}

pub struct SessionHub {
    sessions: DashMap<Uuid, Session>,
    rooms: DashMap<String, HashSet<Uuid>>,
    memberships: DashMap<Uuid, HashSet<String>>,
    store: Arc<dyn Store>,
    ledger: EntitlementLedger,
    presence: Arc<PresenceTracker>,
}

impl SessionHub {
    pub fn new(store: Arc<dyn Store>, ledger: EntitlementLedger, presence: Arc<PresenceTracker>) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            store,
            ledger,
            presence,
        }
    }

    /// Open the user's channel, replacing any previous one, and announce the
    /// user to their connections.
    pub async fn connect(&self, user_id: Uuid) -> SessionHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();

        let _ = tx.send(ServerEvent::Connected { user_id });
        if self.sessions.insert(user_id, Session { id: session_id, tx }).is_some() {
            info!("🔁 User {} reconnected, previous session replaced", user_id);
        } else {
            info!("🔌 User {} connected", user_id);
        }

        self.presence.touch(user_id);
        self.presence.persist_activity(user_id).await;
        self.notify_connections(user_id, true).await;

        SessionHandle {
            session_id,
            user_id,
            events,
        }
    }

    /// Close the session if it is still the user's current one. A session
    /// that was replaced by a reconnect leaves the new one alone.
    pub async fn disconnect(&self, user_id: Uuid, session_id: Uuid) {
        if self
            .sessions
            .remove_if(&user_id, |_, session| session.id == session_id)
            .is_none()
        {
            debug!("Stale session {} for user {} closed", session_id, user_id);
            return;
        }

        self.leave_all_rooms(user_id);
        self.presence.persist_activity(user_id).await;
        self.notify_connections(user_id, false).await;
        info!("👋 User {} disconnected", user_id);
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Push an event to the user's channel. Returns `false` when the user has
    /// no open channel; that is not an error.
    pub fn deliver(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.sessions.get(&user_id) {
            Some(session) => session.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Handle one inbound event. Failures go back to the sender as an
    /// `error` event and never close the session.
    pub async fn dispatch(&self, user_id: Uuid, event: ClientEvent) {
        self.presence.touch(user_id);
        if let Err(e) = self.handle(user_id, event).await {
            if let AppError::Store(inner) = &e {
                warn!("Realtime event from {} failed on storage: {:#}", user_id, inner);
            }
            self.deliver(
                user_id,
                ServerEvent::Error {
                    code: e.code().to_string(),
                    message: e.public_message(),
                },
            );
        }
    }

    pub async fn handle(&self, user_id: Uuid, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::SendMessage {
                receiver_id,
                body,
                kind,
            } => self.send_message(user_id, receiver_id, body, kind).await,
            ClientEvent::Typing {
                receiver_id,
                is_typing,
            } => {
                self.relay_typing(user_id, receiver_id, is_typing);
                Ok(())
            }
            ClientEvent::TypingStart { receiver_id } => {
                self.relay_typing(user_id, receiver_id, true);
                Ok(())
            }
            ClientEvent::TypingStop { receiver_id } => {
                self.relay_typing(user_id, receiver_id, false);
                Ok(())
            }
            ClientEvent::CallOffer { receiver_id, payload } => {
                self.relay_signal(user_id, receiver_id, SignalKind::Offer, payload).await
            }
            ClientEvent::CallAnswer { receiver_id, payload } => {
                self.relay_signal(user_id, receiver_id, SignalKind::Answer, payload).await
            }
            ClientEvent::CallIceCandidate { receiver_id, payload } => {
                self.relay_signal(user_id, receiver_id, SignalKind::IceCandidate, payload).await
            }
            ClientEvent::CallEnd { receiver_id, payload } => {
                self.relay_signal(user_id, receiver_id, SignalKind::End, payload).await
            }
            ClientEvent::SendGift {
                receiver_id,
                gift_kind,
                message,
            } => self.send_gift(user_id, receiver_id, &gift_kind, message).await,
            ClientEvent::JoinRoom { room_id } => {
                self.join_room(user_id, room_id);
                Ok(())
            }
            ClientEvent::LeaveRoom { room_id } => {
                self.leave_room(user_id, &room_id);
                Ok(())
            }
            ClientEvent::RoomMessage { room_id, body, kind } => {
                self.broadcast_room(
                    &room_id,
                    user_id,
                    ServerEvent::RoomMessage {
                        sender_id: user_id,
                        room_id: room_id.clone(),
                        body,
                        kind: kind.unwrap_or_else(|| DEFAULT_MESSAGE_KIND.to_string()),
                        timestamp: Utc::now(),
                    },
                );
                Ok(())
            }
            ClientEvent::Ping => {
                self.deliver(user_id, ServerEvent::Pong { timestamp: Utc::now() });
                Ok(())
            }
        }
    }

    async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: String,
        kind: Option<String>,
    ) -> AppResult<()> {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            body,
            kind: kind.unwrap_or_else(|| DEFAULT_MESSAGE_KIND.to_string()),
            created_at: Utc::now(),
        };
        self.store.insert_message(&message).await?;
        self.bump_interaction(sender_id, receiver_id, Interaction::Message, message.created_at)
            .await;

        let ack = ServerEvent::MessageSent {
            message_id: message.id,
            status: DeliveryStatus::Delivered,
            timestamp: message.created_at,
        };
        self.deliver(
            receiver_id,
            ServerEvent::NewMessage {
                id: message.id,
                sender_id,
                receiver_id,
                body: message.body,
                kind: message.kind,
                timestamp: message.created_at,
            },
        );
        self.deliver(sender_id, ack);
        Ok(())
    }

    fn relay_typing(&self, sender_id: Uuid, receiver_id: Uuid, is_typing: bool) {
        self.deliver(
            receiver_id,
            ServerEvent::UserTyping {
                sender_id,
                is_typing,
            },
        );
    }

    async fn relay_signal(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        kind: SignalKind,
        payload: Value,
    ) -> AppResult<()> {
        let now = Utc::now();
        if kind == SignalKind::Offer {
            self.bump_interaction(sender_id, receiver_id, Interaction::Call, now).await;
        }
        self.deliver(receiver_id, ServerEvent::signal(kind, sender_id, payload, now));
        Ok(())
    }

    async fn send_gift(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        gift_kind: &str,
        message: Option<String>,
    ) -> AppResult<()> {
        let kind = GiftKind::parse(gift_kind).ok_or(AppError::InvalidGift)?;
        let cost = kind.cost();
        if !self.ledger.debit_gift_credits(sender_id, cost).await? {
            return Err(AppError::InsufficientCredits);
        }

        let gift = GiftEvent::new(sender_id, receiver_id, kind, message, Utc::now());
        if let Err(e) = self.store.insert_gift(&gift).await {
            warn!("Refunding {} credit(s) to {} after failed gift insert", cost, sender_id);
            self.ledger.grant_gift_credits(sender_id, cost).await?;
            return Err(e.into());
        }
        self.bump_interaction(sender_id, receiver_id, Interaction::Gift, gift.created_at)
            .await;

        let credits_remaining = match self.store.get_user(sender_id).await {
            Ok(user) => user.map(|user| user.gift_credits),
            Err(_) => None,
        };
        self.deliver(
            receiver_id,
            ServerEvent::GiftReceived {
                id: gift.id,
                sender_id,
                gift_kind: gift.kind,
                message: gift.message,
                timestamp: gift.created_at,
            },
        );
        self.deliver(
            sender_id,
            ServerEvent::GiftSent {
                gift_id: gift.id,
                status: DeliveryStatus::Delivered,
                credits_remaining,
            },
        );
        info!("🎁 {} sent {} to {}", sender_id, kind.as_str(), receiver_id);
        Ok(())
    }

    /// Connection counters are bookkeeping. A failed write never blocks the
    /// delivery it accompanies.
    async fn bump_interaction(&self, sender_id: Uuid, receiver_id: Uuid, interaction: Interaction, at: DateTime<Utc>) {
        if let Err(e) = self
            .store
            .record_interaction(Pair::new(sender_id, receiver_id), interaction, at)
            .await
        {
            warn!(
                "Failed to record {:?} between {} and {}: {}",
                interaction, sender_id, receiver_id, e
            );
        }
    }

    pub fn join_room(&self, user_id: Uuid, room_id: String) {
        let others: Vec<Uuid> = {
            let mut members = self.rooms.entry(room_id.clone()).or_default();
            if !members.insert(user_id) {
                return;
            }
            members.iter().copied().filter(|member| *member != user_id).collect()
        };
        self.memberships.entry(user_id).or_default().insert(room_id.clone());

        let timestamp = Utc::now();
        for member in others {
            self.deliver(
                member,
                ServerEvent::UserJoinedRoom {
                    user_id,
                    room_id: room_id.clone(),
                    timestamp,
                },
            );
        }
    }

    pub fn leave_room(&self, user_id: Uuid, room_id: &str) {
        if let Some(mut rooms) = self.memberships.get_mut(&user_id) {
            rooms.remove(room_id);
        }
        self.memberships.remove_if(&user_id, |_, rooms| rooms.is_empty());
        self.remove_from_room(user_id, room_id);
    }

    fn leave_all_rooms(&self, user_id: Uuid) {
        if let Some((_, rooms)) = self.memberships.remove(&user_id) {
            for room_id in rooms {
                self.remove_from_room(user_id, &room_id);
            }
        }
    }

    fn remove_from_room(&self, user_id: Uuid, room_id: &str) {
        let remaining: Vec<Uuid> = match self.rooms.get_mut(room_id) {
            Some(mut members) => {
                if !members.remove(&user_id) {
                    return;
                }
                members.iter().copied().collect()
            }
            None => return,
        };
        self.rooms.remove_if(room_id, |_, members| members.is_empty());

        let timestamp = Utc::now();
        for member in remaining {
            self.deliver(
                member,
                ServerEvent::UserLeftRoom {
                    user_id,
                    room_id: room_id.to_string(),
                    timestamp,
                },
            );
        }
    }

    /// Fan out to every member except the sender. The sender need not be a member.
    pub fn broadcast_room(&self, room_id: &str, sender_id: Uuid, event: ServerEvent) {
        let members: Vec<Uuid> = match self.rooms.get(room_id) {
            Some(members) => members.iter().copied().filter(|member| *member != sender_id).collect(),
            None => return,
        };
        for member in members {
            self.deliver(member, event.clone());
        }
    }

    pub fn room_members(&self, room_id: &str) -> HashSet<Uuid> {
        self.rooms.get(room_id).map(|members| members.clone()).unwrap_or_default()
    }

    async fn notify_connections(&self, user_id: Uuid, online: bool) {
        let peers = match self.presence.connections_of(user_id).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!("Could not load connections of {} for presence fan-out: {}", user_id, e);
                return;
            }
        };

        let timestamp = Utc::now();
        for peer in peers {
            let event = if online {
                ServerEvent::ConnectionOnline { user_id, timestamp }
            } else {
                ServerEvent::ConnectionOffline { user_id, timestamp }
            };
            self.deliver(peer, event);
        }
    }
}

/// Random room id for a call, e.g. `room_1718000000000_k3j9x2ma1`.
pub fn generate_room_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("room_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DebitOutcome, MemoryStore, SpinCommit};
    use crate::models::{Connection, MatchPreferences, MatchProposal, User};

    struct Fixture {
        store: Arc<MemoryStore>,
        hub: SessionHub,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ledger = EntitlementLedger::new(store.clone());
        let presence = Arc::new(PresenceTracker::new(store.clone()));
        let hub = SessionHub::new(store.clone(), ledger, presence);
        Fixture { store, hub }
    }

    async fn seed(store: &MemoryStore, name: &str, gift_credits: i32) -> User {
        let mut user = User::new(name);
        user.gift_credits = gift_credits;
        store.insert_user(&user).await.unwrap();
        user
    }

    async fn connect_pair(store: &MemoryStore, a: &User, b: &User) {
        let now = Utc::now();
        let proposal = MatchProposal::new(a.id, b.id, MatchPreferences::default(), now);
        store.insert_proposal(proposal.clone());
        store.accept_proposal(proposal.id, now).await.unwrap();
    }

    fn drain(handle: &mut SessionHandle) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = handle.events.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_message_is_delivered_and_acknowledged_with_same_id() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let b = seed(&fx.store, "b", 0).await;
        connect_pair(&fx.store, &a, &b).await;
        let mut sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        drain(&mut sa);
        drain(&mut sb);

        fx.hub
            .dispatch(
                a.id,
                ClientEvent::SendMessage {
                    receiver_id: b.id,
                    body: "hi".into(),
                    kind: None,
                },
            )
            .await;

        let delivered = drain(&mut sb);
        let acked = drain(&mut sa);
        let (ServerEvent::NewMessage { id, body, kind, .. }, ServerEvent::MessageSent { message_id, .. }) =
            (&delivered[0], &acked[0])
        else {
            panic!("unexpected events: {delivered:?} / {acked:?}");
        };
        assert_eq!(id, message_id);
        assert_eq!(body, "hi");
        assert_eq!(kind, "text");
        assert_eq!(fx.store.messages().len(), 1);
        assert_eq!(fx.store.all_connections()[0].message_count, 1);
    }

    #[tokio::test]
    async fn test_messages_keep_sender_order() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let b = seed(&fx.store, "b", 0).await;
        let _sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        drain(&mut sb);

        for i in 0..5 {
            fx.hub
                .dispatch(
                    a.id,
                    ClientEvent::SendMessage {
                        receiver_id: b.id,
                        body: format!("m{i}"),
                        kind: None,
                    },
                )
                .await;
        }
        let bodies: Vec<String> = drain(&mut sb)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::NewMessage { body, .. } => Some(body),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_delivery_to_absent_user_is_silent() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let mut sa = fx.hub.connect(a.id).await;
        drain(&mut sa);

        fx.hub
            .dispatch(
                a.id,
                ClientEvent::Typing {
                    receiver_id: Uuid::new_v4(),
                    is_typing: true,
                },
            )
            .await;
        assert!(drain(&mut sa).is_empty());
    }

    #[tokio::test]
    async fn test_gift_debits_and_notifies() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 10).await;
        let b = seed(&fx.store, "b", 0).await;
        let mut sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        drain(&mut sa);
        drain(&mut sb);

        fx.hub
            .dispatch(
                a.id,
                ClientEvent::SendGift {
                    receiver_id: b.id,
                    gift_kind: "diamond".into(),
                    message: Some("for you".into()),
                },
            )
            .await;

        assert!(matches!(
            drain(&mut sb).as_slice(),
            [ServerEvent::GiftReceived { gift_kind: GiftKind::Diamond, .. }]
        ));
        assert!(matches!(
            drain(&mut sa).as_slice(),
            [ServerEvent::GiftSent { credits_remaining: Some(5), .. }]
        ));
        let sender = fx.store.get_user(a.id).await.unwrap().unwrap();
        let receiver = fx.store.get_user(b.id).await.unwrap().unwrap();
        assert_eq!(sender.gift_credits, 5);
        assert_eq!(sender.total_gifts_sent, 1);
        assert_eq!(receiver.total_gifts_received, 1);
    }

    #[tokio::test]
    async fn test_gift_with_insufficient_credits_leaves_balance() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 3).await;
        let b = seed(&fx.store, "b", 0).await;
        let mut sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        drain(&mut sa);
        drain(&mut sb);

        fx.hub
            .dispatch(
                a.id,
                ClientEvent::SendGift {
                    receiver_id: b.id,
                    gift_kind: "diamond".into(),
                    message: None,
                },
            )
            .await;

        match drain(&mut sa).as_slice() {
            [ServerEvent::Error { code, .. }] => assert_eq!(code, "insufficient_credits"),
            other => panic!("expected an error event, got {other:?}"),
        }
        assert!(drain(&mut sb).is_empty());
        assert_eq!(fx.store.get_user(a.id).await.unwrap().unwrap().gift_credits, 3);
        assert!(fx.store.gifts().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_gift_kind() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 100).await;
        let err = fx
            .hub
            .handle(
                a.id,
                ClientEvent::SendGift {
                    receiver_id: Uuid::new_v4(),
                    gift_kind: "unicorn".into(),
                    message: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidGift));
        assert_eq!(fx.store.get_user(a.id).await.unwrap().unwrap().gift_credits, 100);
    }

    #[tokio::test]
    async fn test_call_signals_are_relayed_and_offers_counted() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let b = seed(&fx.store, "b", 0).await;
        connect_pair(&fx.store, &a, &b).await;
        let _sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        drain(&mut sb);

        let sdp = serde_json::json!({"sdp": "v=0"});
        fx.hub
            .dispatch(a.id, ClientEvent::CallOffer { receiver_id: b.id, payload: sdp.clone() })
            .await;
        fx.hub
            .dispatch(a.id, ClientEvent::CallEnd { receiver_id: b.id, payload: Value::Null })
            .await;

        let events = drain(&mut sb);
        assert!(matches!(&events[0], ServerEvent::CallOffer { sender_id, payload, .. } if *sender_id == a.id && *payload == sdp));
        assert!(matches!(&events[1], ServerEvent::CallEnd { .. }));
        let connection = &fx.store.all_connections()[0];
        assert_eq!(connection.call_count, 1);
        assert!(connection.last_call_at.is_some());
    }

    #[tokio::test]
    async fn test_rooms_fan_out_and_clean_up_on_disconnect() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let b = seed(&fx.store, "b", 0).await;
        let c = seed(&fx.store, "c", 0).await;
        let sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        let mut sc = fx.hub.connect(c.id).await;
        drain(&mut sc);

        fx.hub.join_room(a.id, "lobby".into());
        fx.hub.join_room(b.id, "lobby".into());
        drain(&mut sb);

        fx.hub
            .dispatch(
                c.id,
                ClientEvent::RoomMessage {
                    room_id: "lobby".into(),
                    body: "anyone?".into(),
                    kind: None,
                },
            )
            .await;
        assert_eq!(drain(&mut sb).len(), 1);
        assert!(drain(&mut sc).is_empty());

        fx.hub.disconnect(a.id, sa.session_id).await;
        assert!(matches!(
            drain(&mut sb).as_slice(),
            [ServerEvent::UserLeftRoom { user_id, .. }] if *user_id == a.id
        ));
        assert_eq!(fx.hub.room_members("lobby"), HashSet::from([b.id]));

        fx.hub.leave_room(b.id, "lobby");
        assert!(fx.hub.room_members("lobby").is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let mut first = fx.hub.connect(a.id).await;
        let mut second = fx.hub.connect(a.id).await;
        drain(&mut second);

        // The old writer sees its channel closed once drained.
        assert!(matches!(first.events.recv().await, Some(ServerEvent::Connected { .. })));
        assert!(first.events.recv().await.is_none());

        fx.hub.disconnect(a.id, first.session_id).await;
        assert!(fx.hub.is_connected(a.id));
        assert!(fx.hub.deliver(a.id, ServerEvent::Pong { timestamp: Utc::now() }));
        assert_eq!(drain(&mut second).len(), 1);

        fx.hub.disconnect(a.id, second.session_id).await;
        assert!(!fx.hub.is_connected(a.id));
        assert_eq!(fx.hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_connections_hear_online_and_offline() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let b = seed(&fx.store, "b", 0).await;
        let stranger = seed(&fx.store, "stranger", 0).await;
        connect_pair(&fx.store, &a, &b).await;
        let mut sb = fx.hub.connect(b.id).await;
        let mut ss = fx.hub.connect(stranger.id).await;
        drain(&mut sb);
        drain(&mut ss);

        let sa = fx.hub.connect(a.id).await;
        assert!(matches!(drain(&mut sb).as_slice(), [ServerEvent::ConnectionOnline { user_id, .. }] if *user_id == a.id));

        fx.hub.disconnect(a.id, sa.session_id).await;
        assert!(matches!(drain(&mut sb).as_slice(), [ServerEvent::ConnectionOffline { .. }]));
        assert!(drain(&mut ss).is_empty());
        assert!(fx.store.get_user(a.id).await.unwrap().unwrap().last_active_at.is_some());
    }

    #[tokio::test]
    async fn test_typing_start_and_stop_relay_flags() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let b = seed(&fx.store, "b", 0).await;
        let _sa = fx.hub.connect(a.id).await;
        let mut sb = fx.hub.connect(b.id).await;
        drain(&mut sb);

        fx.hub.dispatch(a.id, ClientEvent::TypingStart { receiver_id: b.id }).await;
        fx.hub.dispatch(a.id, ClientEvent::TypingStop { receiver_id: b.id }).await;

        assert!(matches!(
            drain(&mut sb).as_slice(),
            [
                ServerEvent::UserTyping { is_typing: true, .. },
                ServerEvent::UserTyping { is_typing: false, .. }
            ]
        ));
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let fx = fixture();
        let a = seed(&fx.store, "a", 0).await;
        let mut sa = fx.hub.connect(a.id).await;
        drain(&mut sa);
        fx.hub.dispatch(a.id, ClientEvent::Ping).await;
        assert!(matches!(drain(&mut sa).as_slice(), [ServerEvent::Pong { .. }]));
    }

    /// Memory store whose connection counters always fail to write.
    struct CountersDown(MemoryStore);

    #[async_trait::async_trait]
    impl Store for CountersDown {
        async fn insert_user(&self, user: &User) -> anyhow::Result<()> {
            self.0.insert_user(user).await
        }
        async fn get_user(&self, user_id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.get_user(user_id).await
        }
        async fn set_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
            self.0.set_last_active(user_id, at).await
        }
        async fn counterparts_of(&self, user_id: Uuid) -> anyhow::Result<HashSet<Uuid>> {
            self.0.counterparts_of(user_id).await
        }
        async fn sample_candidates(
            &self,
            excluded: &HashSet<Uuid>,
            preferences: &MatchPreferences,
            limit: usize,
        ) -> anyhow::Result<Vec<User>> {
            self.0.sample_candidates(excluded, preferences, limit).await
        }
        async fn commit_spin(&self, proposal: &MatchProposal, now: DateTime<Utc>) -> anyhow::Result<SpinCommit> {
            self.0.commit_spin(proposal, now).await
        }
        async fn get_proposal(&self, proposal_id: Uuid) -> anyhow::Result<Option<MatchProposal>> {
            self.0.get_proposal(proposal_id).await
        }
        async fn proposals_of(&self, user_id: Uuid) -> anyhow::Result<Vec<MatchProposal>> {
            self.0.proposals_of(user_id).await
        }
        async fn accept_proposal(
            &self,
            proposal_id: Uuid,
            now: DateTime<Utc>,
        ) -> anyhow::Result<Option<(MatchProposal, Connection)>> {
            self.0.accept_proposal(proposal_id, now).await
        }
        async fn reject_proposal(&self, proposal_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<MatchProposal>> {
            self.0.reject_proposal(proposal_id, now).await
        }
        async fn connections_of(&self, user_id: Uuid) -> anyhow::Result<Vec<Connection>> {
            self.0.connections_of(user_id).await
        }
        async fn record_interaction(&self, _: Pair, _: Interaction, _: DateTime<Utc>) -> anyhow::Result<()> {
            anyhow::bail!("connection counters unavailable")
        }
        async fn debit_spin(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<DebitOutcome> {
            self.0.debit_spin(user_id, now).await
        }
        async fn grant_vip(&self, user_id: Uuid, days: i64, now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.0.grant_vip(user_id, days, now).await
        }
        async fn grant_spins(&self, user_id: Uuid, count: i32) -> anyhow::Result<bool> {
            self.0.grant_spins(user_id, count).await
        }
        async fn grant_gift_credits(&self, user_id: Uuid, count: i32) -> anyhow::Result<bool> {
            self.0.grant_gift_credits(user_id, count).await
        }
        async fn debit_gift_credits(&self, user_id: Uuid, cost: i32) -> anyhow::Result<DebitOutcome> {
            self.0.debit_gift_credits(user_id, cost).await
        }
        async fn insert_message(&self, message: &StoredMessage) -> anyhow::Result<()> {
            self.0.insert_message(message).await
        }
        async fn insert_gift(&self, gift: &GiftEvent) -> anyhow::Result<()> {
            self.0.insert_gift(gift).await
        }
    }

    #[tokio::test]
    async fn test_counter_failure_still_delivers_and_acks() {
        let store = Arc::new(CountersDown(MemoryStore::new()));
        let ledger = EntitlementLedger::new(store.clone());
        let presence = Arc::new(PresenceTracker::new(store.clone()));
        let hub = SessionHub::new(store.clone(), ledger, presence);

        let mut a = User::new("a");
        a.gift_credits = 10;
        let b = User::new("b");
        store.insert_user(&a).await.unwrap();
        store.insert_user(&b).await.unwrap();
        let mut sa = hub.connect(a.id).await;
        let mut sb = hub.connect(b.id).await;
        drain(&mut sa);
        drain(&mut sb);

        hub.dispatch(
            a.id,
            ClientEvent::SendMessage {
                receiver_id: b.id,
                body: "still here".into(),
                kind: None,
            },
        )
        .await;
        hub.dispatch(
            a.id,
            ClientEvent::SendGift {
                receiver_id: b.id,
                gift_kind: "diamond".into(),
                message: None,
            },
        )
        .await;
        hub.dispatch(a.id, ClientEvent::CallOffer { receiver_id: b.id, payload: Value::Null })
            .await;

        assert!(matches!(
            drain(&mut sb).as_slice(),
            [
                ServerEvent::NewMessage { .. },
                ServerEvent::GiftReceived { .. },
                ServerEvent::CallOffer { .. }
            ]
        ));
        assert!(matches!(
            drain(&mut sa).as_slice(),
            [
                ServerEvent::MessageSent { .. },
                ServerEvent::GiftSent { credits_remaining: Some(5), .. }
            ]
        ));
        assert_eq!(store.0.messages().len(), 1);
        assert_eq!(store.0.gifts().len(), 1);
    }

    #[test]
    fn test_room_id_shape() {
        let id = generate_room_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "room");
        assert_eq!(parts[2].len(), 9);
        assert_ne!(generate_room_id(), id);
    }
}
