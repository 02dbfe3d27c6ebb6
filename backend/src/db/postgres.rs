use std::collections::HashSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, types::Json, PgPool, Row};
use uuid::Uuid;

use super::store::{extended_vip_expiry, DebitOutcome, SpinCommit, Store};
use crate::models::{
    Connection, ConnectionStatus, GiftEvent, Interaction, MatchPreferences, MatchProposal, Pair,
    ProposalStatus, StoredMessage, User, UserStatus,
};

const USER_COLUMNS: &str = "id, display_name, age, interests, status, is_vip, vip_level, vip_expires_at, \
    free_spins, total_spins, gift_credits, total_gifts_sent, total_gifts_received, last_active_at, created_at";

const PROPOSAL_COLUMNS: &str =
    "id, initiator_id, candidate_id, status, preferences, created_at, expires_at, accepted_at, rejected_at";

const CONNECTION_COLUMNS: &str = "id, user_id_1, user_id_2, status, message_count, call_count, gift_count, \
    last_message_at, last_call_at, last_interaction_at, created_at";

fn user_from_row(row: &PgRow) -> Result<User> {
    let status: String = row.try_get("status")?;
    Ok(User {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        age: row.try_get("age")?,
        interests: row.try_get("interests")?,
        status: UserStatus::parse(&status).ok_or_else(|| anyhow!("Unknown user status '{}'", status))?,
        is_vip: row.try_get("is_vip")?,
        vip_level: row.try_get("vip_level")?,
        vip_expires_at: row.try_get("vip_expires_at")?,
        free_spins: row.try_get("free_spins")?,
        total_spins: row.try_get("total_spins")?,
        gift_credits: row.try_get("gift_credits")?,
        total_gifts_sent: row.try_get("total_gifts_sent")?,
        total_gifts_received: row.try_get("total_gifts_received")?,
        last_active_at: row.try_get("last_active_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn proposal_from_row(row: &PgRow) -> Result<MatchProposal> {
    let status: String = row.try_get("status")?;
    let preferences: Json<MatchPreferences> = row.try_get("preferences")?;
    Ok(MatchProposal {
        id: row.try_get("id")?,
        initiator_id: row.try_get("initiator_id")?,
        candidate_id: row.try_get("candidate_id")?,
        status: ProposalStatus::parse(&status).ok_or_else(|| anyhow!("Unknown proposal status '{}'", status))?,
        preferences: preferences.0,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        accepted_at: row.try_get("accepted_at")?,
        rejected_at: row.try_get("rejected_at")?,
    })
}

fn connection_from_row(row: &PgRow) -> Result<Connection> {
    let status: String = row.try_get("status")?;
    Ok(Connection {
        id: row.try_get("id")?,
        user_id_1: row.try_get("user_id_1")?,
        user_id_2: row.try_get("user_id_2")?,
        status: ConnectionStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown connection status '{}'", status))?,
        message_count: row.try_get("message_count")?,
        call_count: row.try_get("call_count")?,
        gift_count: row.try_get("gift_count")?,
        last_message_at: row.try_get("last_message_at")?,
        last_call_at: row.try_get("last_call_at")?,
        last_interaction_at: row.try_get("last_interaction_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// `Store` backed by Postgres. Atomic operations run in a transaction holding
/// the user's row lock, or as a single conditional statement.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, age, interests, status, is_vip, vip_level, vip_expires_at,
                free_spins, total_spins, gift_credits, total_gifts_sent, total_gifts_received,
                last_active_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(user.age)
        .bind(&user.interests)
        .bind(user.status.as_str())
        .bind(user.is_vip)
        .bind(user.vip_level)
        .bind(user.vip_expires_at)
        .bind(user.free_spins)
        .bind(user.total_spins)
        .bind(user.gift_credits)
        .bind(user.total_gifts_sent)
        .bind(user.total_gifts_received)
        .bind(user.last_active_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql).bind(user_id).fetch_optional(&self.pool).await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_last_active(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_active_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn counterparts_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let counterparts = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT CASE WHEN initiator_id = $1 THEN candidate_id ELSE initiator_id END
            FROM match_proposals
            WHERE initiator_id = $1 OR candidate_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(counterparts.into_iter().collect())
    }

    async fn sample_candidates(
        &self,
        excluded: &HashSet<Uuid>,
        preferences: &MatchPreferences,
        limit: usize,
    ) -> Result<Vec<User>> {
        let excluded: Vec<Uuid> = excluded.iter().copied().collect();
        let interests: Vec<String> = preferences.interests.clone().unwrap_or_default();
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE status = 'active'
            AND NOT (id = ANY($1))
            AND ($2::INT4 IS NULL OR age >= $2)
            AND ($3::INT4 IS NULL OR age <= $3)
            AND (cardinality($4::TEXT[]) = 0 OR interests && $4)
            ORDER BY RANDOM()
            LIMIT $5
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&excluded)
            .bind(preferences.age_min)
            .bind(preferences.age_max)
            .bind(&interests)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn commit_spin(&self, proposal: &MatchProposal, now: DateTime<Utc>) -> Result<SpinCommit> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        let Some(row) = sqlx::query(&sql)
            .bind(proposal.initiator_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(SpinCommit::UserMissing);
        };
        let user = user_from_row(&row)?;
        if !user.can_spin(now) {
            return Ok(SpinCommit::NotEntitled);
        }

        let pair = proposal.pair();
        let inserted = sqlx::query(
            r#"
            INSERT INTO match_proposals (id, initiator_id, candidate_id, pair_low, pair_high, status,
                preferences, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (pair_low, pair_high) DO NOTHING
            "#,
        )
        .bind(proposal.id)
        .bind(proposal.initiator_id)
        .bind(proposal.candidate_id)
        .bind(pair.low)
        .bind(pair.high)
        .bind(proposal.status.as_str())
        .bind(Json(&proposal.preferences))
        .bind(proposal.created_at)
        .bind(proposal.expires_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(SpinCommit::PairTaken);
        }

        let debit: i32 = if user.vip_active(now) { 0 } else { 1 };
        sqlx::query(
            r#"
            UPDATE users
            SET free_spins = free_spins - $2, total_spins = total_spins + 1, last_active_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(debit)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(SpinCommit::Committed)
    }

    async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<MatchProposal>> {
        let sql = format!("SELECT {PROPOSAL_COLUMNS} FROM match_proposals WHERE id = $1");
        let row = sqlx::query(&sql).bind(proposal_id).fetch_optional(&self.pool).await?;

        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn proposals_of(&self, user_id: Uuid) -> Result<Vec<MatchProposal>> {
        let sql = format!(
            r#"
            SELECT {PROPOSAL_COLUMNS}
            FROM match_proposals
            WHERE initiator_id = $1 OR candidate_id = $1
            ORDER BY created_at DESC
            "#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;

        rows.iter().map(proposal_from_row).collect()
    }

    async fn accept_proposal(
        &self,
        proposal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<(MatchProposal, Connection)>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE match_proposals
            SET status = 'accepted', accepted_at = $2
            WHERE id = $1 AND status = 'pending' AND expires_at >= $2
            RETURNING {PROPOSAL_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query(&sql)
            .bind(proposal_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let proposal = proposal_from_row(&row)?;

        let fresh = Connection::new(proposal.pair(), now);
        sqlx::query(
            r#"
            INSERT INTO connections (id, user_id_1, user_id_2, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id_1, user_id_2) DO NOTHING
            "#,
        )
        .bind(fresh.id)
        .bind(fresh.user_id_1)
        .bind(fresh.user_id_2)
        .bind(fresh.status.as_str())
        .bind(fresh.created_at)
        .execute(&mut *tx)
        .await?;

        let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE user_id_1 = $1 AND user_id_2 = $2");
        let row = sqlx::query(&sql)
            .bind(fresh.user_id_1)
            .bind(fresh.user_id_2)
            .fetch_one(&mut *tx)
            .await?;
        let connection = connection_from_row(&row)?;

        tx.commit().await?;
        Ok(Some((proposal, connection)))
    }

    async fn reject_proposal(&self, proposal_id: Uuid, now: DateTime<Utc>) -> Result<Option<MatchProposal>> {
        let sql = format!(
            r#"
            UPDATE match_proposals
            SET status = 'rejected', rejected_at = $2
            WHERE id = $1 AND status = 'pending' AND expires_at >= $2
            RETURNING {PROPOSAL_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(proposal_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(proposal_from_row).transpose()
    }

    async fn connections_of(&self, user_id: Uuid) -> Result<Vec<Connection>> {
        let sql = format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE status = 'active' AND (user_id_1 = $1 OR user_id_2 = $1)
            ORDER BY COALESCE(last_interaction_at, created_at) DESC
            "#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;

        rows.iter().map(connection_from_row).collect()
    }

    async fn record_interaction(&self, pair: Pair, interaction: Interaction, at: DateTime<Utc>) -> Result<()> {
        let sql = match interaction {
            Interaction::Message => {
                "UPDATE connections SET message_count = message_count + 1, last_message_at = $3, \
                 last_interaction_at = $3 WHERE user_id_1 = $1 AND user_id_2 = $2"
            }
            Interaction::Call => {
                "UPDATE connections SET call_count = call_count + 1, last_call_at = $3, \
                 last_interaction_at = $3 WHERE user_id_1 = $1 AND user_id_2 = $2"
            }
            Interaction::Gift => {
                "UPDATE connections SET gift_count = gift_count + 1, \
                 last_interaction_at = $3 WHERE user_id_1 = $1 AND user_id_2 = $2"
            }
        };
        sqlx::query(sql)
            .bind(pair.low)
            .bind(pair.high)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn debit_spin(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<DebitOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET free_spins = CASE
                WHEN is_vip AND (vip_expires_at IS NULL OR vip_expires_at > $2) THEN free_spins
                ELSE free_spins - 1
            END
            WHERE id = $1
            AND (free_spins > 0 OR (is_vip AND (vip_expires_at IS NULL OR vip_expires_at > $2)))
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(DebitOutcome::Applied)
        } else if self.user_exists(user_id).await? {
            Ok(DebitOutcome::Insufficient)
        } else {
            Ok(DebitOutcome::UserMissing)
        }
    }

    async fn grant_vip(&self, user_id: Uuid, days: i64, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT vip_expires_at FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE users
            SET is_vip = TRUE, vip_level = GREATEST(vip_level, 1), vip_expires_at = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(extended_vip_expiry(current, days, now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn grant_spins(&self, user_id: Uuid, count: i32) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET free_spins = free_spins + $2 WHERE id = $1")
            .bind(user_id)
            .bind(count)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn grant_gift_credits(&self, user_id: Uuid, count: i32) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET gift_credits = gift_credits + $2 WHERE id = $1")
            .bind(user_id)
            .bind(count)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn debit_gift_credits(&self, user_id: Uuid, cost: i32) -> Result<DebitOutcome> {
        let result = sqlx::query(
            "UPDATE users SET gift_credits = gift_credits - $2 WHERE id = $1 AND gift_credits >= $2",
        )
        .bind(user_id)
        .bind(cost)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(DebitOutcome::Applied)
        } else if self.user_exists(user_id).await? {
            Ok(DebitOutcome::Insufficient)
        } else {
            Ok(DebitOutcome::UserMissing)
        }
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, body, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.body)
        .bind(&message.kind)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_gift(&self, gift: &GiftEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO gifts (id, sender_id, receiver_id, kind, cost, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(gift.id)
        .bind(gift.sender_id)
        .bind(gift.receiver_id)
        .bind(gift.kind.as_str())
        .bind(gift.kind.cost())
        .bind(&gift.message)
        .bind(gift.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET total_gifts_sent = total_gifts_sent + 1 WHERE id = $1")
            .bind(gift.sender_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET total_gifts_received = total_gifts_received + 1 WHERE id = $1")
            .bind(gift.receiver_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
