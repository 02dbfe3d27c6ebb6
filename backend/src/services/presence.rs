use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    constants::ONLINE_WINDOW_MINUTES,
    db::Store,
    error::AppResult,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_active_at: Option<DateTime<Utc>>,
}

/// Online status derived from the last time each user was seen.
///
/// Nothing stores an "online" flag: a user drops offline by simply not being
/// seen for the online window, so a lost disconnect can't pin them online.
pub struct PresenceTracker {
    last_seen: DashMap<Uuid, DateTime<Utc>>,
    store: Arc<dyn Store>,
    window: Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            last_seen: DashMap::new(),
            store,
            window: Duration::minutes(ONLINE_WINDOW_MINUTES),
        }
    }

    pub fn touch(&self, user_id: Uuid) {
        self.touch_at(user_id, Utc::now());
    }

    /// Record activity at `at`. Older timestamps never move last-seen backwards.
    pub fn touch_at(&self, user_id: Uuid, at: DateTime<Utc>) {
        self.last_seen
            .entry(user_id)
            .and_modify(|seen| {
                if at > *seen {
                    *seen = at;
                }
            })
            .or_insert(at);
    }

    pub fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.last_seen.get(&user_id).map(|seen| *seen)
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.is_online_at(user_id, Utc::now())
    }

    pub fn is_online_at(&self, user_id: Uuid, now: DateTime<Utc>) -> bool {
        self.last_seen(user_id)
            .is_some_and(|seen| now - seen < self.window)
    }

    /// Users seen within the window. Entries older than the window are
    /// dropped on the way; `status` still finds them through the store.
    pub fn online_users(&self) -> Vec<Uuid> {
        self.online_users_at(Utc::now())
    }

    pub fn online_users_at(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.last_seen.retain(|_, seen| now - *seen < self.window);
        self.last_seen.iter().map(|entry| *entry.key()).collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.last_seen.len()
    }

    /// Peers of the user's active connections.
    pub async fn connections_of(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        let connections = self.store.connections_of(user_id).await?;
        Ok(connections.iter().map(|connection| connection.peer_of(user_id)).collect())
    }

    /// Status for display. Falls back to the stored last activity when this
    /// process has not seen the user.
    pub async fn status(&self, user_id: Uuid) -> AppResult<PresenceStatus> {
        let now = Utc::now();
        let last_active_at = match self.last_seen(user_id) {
            Some(seen) => Some(seen),
            None => self
                .store
                .get_user(user_id)
                .await?
                .and_then(|user| user.last_active_at),
        };

        Ok(PresenceStatus {
            user_id,
            is_online: last_active_at.is_some_and(|seen| now - seen < self.window),
            last_active_at,
        })
    }

    /// Write last activity through to the user record. Best-effort.
    pub async fn persist_activity(&self, user_id: Uuid) {
        let at = self.last_seen(user_id).unwrap_or_else(Utc::now);
        if let Err(e) = self.store.set_last_active(user_id, at).await {
            warn!("Failed to persist last activity for user {}: {}", user_id, e);
        }
    }
}
