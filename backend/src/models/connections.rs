use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use super::matches::Pair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Blocked,
    Deleted,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Blocked => "blocked",
            ConnectionStatus::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ConnectionStatus::Active),
            "blocked" => Some(ConnectionStatus::Blocked),
            "deleted" => Some(ConnectionStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub user_id_1: Uuid,
    pub user_id_2: Uuid,
    pub status: ConnectionStatus,
    pub message_count: i32,
    pub call_count: i32,
    pub gift_count: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_call_at: Option<DateTime<Utc>>,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(pair: Pair, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id_1: pair.low,
            user_id_2: pair.high,
            status: ConnectionStatus::Active,
            message_count: 0,
            call_count: 0,
            gift_count: 0,
            last_message_at: None,
            last_call_at: None,
            last_interaction_at: None,
            created_at: now,
        }
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.user_id_1, self.user_id_2)
    }

    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    pub fn peer_of(&self, user_id: Uuid) -> Uuid {
        self.pair().other(user_id)
    }

    /// Sort key for connection listings: latest interaction, falling back to creation.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_interaction_at.unwrap_or(self.created_at)
    }

    pub fn record(&mut self, interaction: Interaction, at: DateTime<Utc>) {
        match interaction {
            Interaction::Message => {
                self.message_count += 1;
                self.last_message_at = Some(at);
            }
            Interaction::Call => {
                self.call_count += 1;
                self.last_call_at = Some(at);
            }
            Interaction::Gift => self.gift_count += 1,
        }
        self.last_interaction_at = Some(at);
    }
}

/// Live activity counted against a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Message,
    Call,
    Gift,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_bumps_counters() {
        let now = Utc::now();
        let pair = Pair::new(Uuid::new_v4(), Uuid::new_v4());
        let mut connection = Connection::new(pair, now);

        connection.record(Interaction::Message, now);
        connection.record(Interaction::Message, now);
        connection.record(Interaction::Call, now);
        connection.record(Interaction::Gift, now);

        assert_eq!(connection.message_count, 2);
        assert_eq!(connection.call_count, 1);
        assert_eq!(connection.gift_count, 1);
        assert_eq!(connection.last_message_at, Some(now));
        assert_eq!(connection.last_call_at, Some(now));
        assert_eq!(connection.recency(), now);
    }

    #[test]
    fn test_connection_stores_canonical_pair() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let connection = Connection::new(Pair::new(b, a), Utc::now());
        assert!(connection.user_id_1 < connection.user_id_2);
        assert_eq!(connection.peer_of(a), b);
    }
}
