//! Frames exchanged over the realtime channel.
//!
//! Both directions are JSON objects tagged by `type` (snake_case) with camelCase
//! fields, e.g. `{"type":"send_message","receiverId":"…","body":"hi"}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use super::gifts::GiftKind;

/// Client → server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    SendMessage {
        receiver_id: Uuid,
        #[serde(alias = "message")]
        body: String,
        #[serde(default)]
        kind: Option<String>,
    },
    Typing {
        receiver_id: Uuid,
        is_typing: bool,
    },
    // Legacy clients announce typing as separate start/stop events.
    TypingStart {
        receiver_id: Uuid,
    },
    TypingStop {
        receiver_id: Uuid,
    },
    #[serde(alias = "video_call_offer")]
    CallOffer {
        receiver_id: Uuid,
        #[serde(default, alias = "offer")]
        payload: Value,
    },
    #[serde(alias = "video_call_answer")]
    CallAnswer {
        receiver_id: Uuid,
        #[serde(default, alias = "answer")]
        payload: Value,
    },
    #[serde(alias = "video_call_ice_candidate")]
    CallIceCandidate {
        receiver_id: Uuid,
        #[serde(default, alias = "candidate")]
        payload: Value,
    },
    #[serde(alias = "video_call_end")]
    CallEnd {
        receiver_id: Uuid,
        #[serde(default)]
        payload: Value,
    },
    SendGift {
        receiver_id: Uuid,
        #[serde(alias = "giftType")]
        gift_kind: String,
        #[serde(default)]
        message: Option<String>,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    RoomMessage {
        room_id: String,
        body: String,
        #[serde(default)]
        kind: Option<String>,
    },
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    End,
}

/// Server → client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Connected {
        user_id: Uuid,
    },
    NewMessage {
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },
    MessageSent {
        message_id: Uuid,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },
    UserTyping {
        sender_id: Uuid,
        is_typing: bool,
    },
    CallOffer {
        sender_id: Uuid,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    CallAnswer {
        sender_id: Uuid,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    CallIceCandidate {
        sender_id: Uuid,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    CallEnd {
        sender_id: Uuid,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    GiftReceived {
        id: Uuid,
        sender_id: Uuid,
        gift_kind: GiftKind,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    GiftSent {
        gift_id: Uuid,
        status: DeliveryStatus,
        credits_remaining: Option<i32>,
    },
    UserJoinedRoom {
        user_id: Uuid,
        room_id: String,
        timestamp: DateTime<Utc>,
    },
    UserLeftRoom {
        user_id: Uuid,
        room_id: String,
        timestamp: DateTime<Utc>,
    },
    RoomMessage {
        sender_id: Uuid,
        room_id: String,
        body: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },
    ConnectionOnline {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    ConnectionOffline {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn signal(kind: SignalKind, sender_id: Uuid, payload: Value, timestamp: DateTime<Utc>) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::CallOffer { sender_id, payload, timestamp },
            SignalKind::Answer => ServerEvent::CallAnswer { sender_id, payload, timestamp },
            SignalKind::IceCandidate => ServerEvent::CallIceCandidate { sender_id, payload, timestamp },
            SignalKind::End => ServerEvent::CallEnd { sender_id, payload, timestamp },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
}
