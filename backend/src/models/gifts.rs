use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftKind {
    Heart,
    Rose,
    Kiss,
    Diamond,
    Crown,
    Star,
    Fire,
    Rainbow,
}

impl GiftKind {
    pub const ALL: [GiftKind; 8] = [
        GiftKind::Heart,
        GiftKind::Rose,
        GiftKind::Kiss,
        GiftKind::Diamond,
        GiftKind::Crown,
        GiftKind::Star,
        GiftKind::Fire,
        GiftKind::Rainbow,
    ];

    /// Credits debited from the sender.
    pub fn cost(&self) -> i32 {
        match self {
            GiftKind::Heart => 1,
            GiftKind::Rose => 2,
            GiftKind::Kiss => 3,
            GiftKind::Diamond => 5,
            GiftKind::Crown => 10,
            GiftKind::Star => 15,
            GiftKind::Fire => 20,
            GiftKind::Rainbow => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GiftKind::Heart => "heart",
            GiftKind::Rose => "rose",
            GiftKind::Kiss => "kiss",
            GiftKind::Diamond => "diamond",
            GiftKind::Crown => "crown",
            GiftKind::Star => "star",
            GiftKind::Fire => "fire",
            GiftKind::Rainbow => "rainbow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftEvent {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub kind: GiftKind,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GiftEvent {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, kind: GiftKind, message: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            kind,
            message,
            created_at: now,
        }
    }
}

/// A chat message as persisted by the message store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}
