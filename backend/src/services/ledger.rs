use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    constants::{GIFT_CREDITS_PER_UNIT, SPIN_PACKAGES, VIP_SUBSCRIPTION_DAYS},
    db::{DebitOutcome, SpinCommit, Store},
    error::{AppError, AppResult},
    models::{MatchProposal, PaymentCompletion, PaymentType},
};

/// Sole writer of spin balances, VIP expiry and gift credits.
///
/// Each operation maps onto one atomic store call, so concurrent mutations
/// of a single user's entitlements are linearized by the store.
#[derive(Clone)]
pub struct EntitlementLedger {
    store: Arc<dyn Store>,
}

impl EntitlementLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn can_spin(&self, user_id: Uuid) -> AppResult<bool> {
        let user = self.store.get_user(user_id).await?.ok_or(AppError::UserNotFound)?;
        Ok(user.can_spin(Utc::now()))
    }

    /// Take one free spin, or nothing when VIP is active.
    pub async fn debit_spin(&self, user_id: Uuid) -> AppResult<()> {
        match self.store.debit_spin(user_id, Utc::now()).await? {
            DebitOutcome::Applied => Ok(()),
            DebitOutcome::Insufficient => Err(AppError::NotEntitled),
            DebitOutcome::UserMissing => Err(AppError::UserNotFound),
        }
    }

    /// Record a spin's proposal together with its debit. Returns `false` when
    /// the pair was claimed by someone else first; nothing is charged then.
    pub async fn settle_spin(&self, proposal: &MatchProposal) -> AppResult<bool> {
        match self.store.commit_spin(proposal, proposal.created_at).await? {
            SpinCommit::Committed => Ok(true),
            SpinCommit::PairTaken => Ok(false),
            SpinCommit::NotEntitled => Err(AppError::NotEntitled),
            SpinCommit::UserMissing => Err(AppError::UserNotFound),
        }
    }

    pub async fn grant_vip(&self, user_id: Uuid, days: i64) -> AppResult<()> {
        if !self.store.grant_vip(user_id, days, Utc::now()).await? {
            return Err(AppError::UserNotFound);
        }
        info!("Granted {} VIP day(s) to user {}", days, user_id);
        Ok(())
    }

    pub async fn grant_spins(&self, user_id: Uuid, count: i32) -> AppResult<()> {
        if !self.store.grant_spins(user_id, count).await? {
            return Err(AppError::UserNotFound);
        }
        info!("Granted {} spin(s) to user {}", count, user_id);
        Ok(())
    }

    pub async fn grant_gift_credits(&self, user_id: Uuid, count: i32) -> AppResult<()> {
        if !self.store.grant_gift_credits(user_id, count).await? {
            return Err(AppError::UserNotFound);
        }
        info!("Granted {} gift credit(s) to user {}", count, user_id);
        Ok(())
    }

    /// `false` (and no mutation) when the balance is below `cost`.
    pub async fn debit_gift_credits(&self, user_id: Uuid, cost: i32) -> AppResult<bool> {
        match self.store.debit_gift_credits(user_id, cost).await? {
            DebitOutcome::Applied => Ok(true),
            DebitOutcome::Insufficient => Ok(false),
            DebitOutcome::UserMissing => Err(AppError::UserNotFound),
        }
    }

    /// Turn a completed payment into its benefit.
    pub async fn apply_payment(&self, payment: &PaymentCompletion) -> AppResult<()> {
        info!(
            "Applying {:?} payment of {:.2} for user {}",
            payment.payment_type, payment.amount, payment.user_id
        );

        match payment.payment_type {
            PaymentType::VipSubscription => self.grant_vip(payment.user_id, VIP_SUBSCRIPTION_DAYS).await,
            PaymentType::SpinsPackage => {
                let spins = spins_for_price(payment.amount_cents()).ok_or_else(|| {
                    AppError::InvalidPayment(format!("no spin package costs {:.2}", payment.amount))
                })?;
                self.grant_spins(payment.user_id, spins).await
            }
            PaymentType::GiftPurchase => {
                let credits = gift_credits_for_price(payment.amount_cents()).ok_or_else(|| {
                    AppError::InvalidPayment(format!("gift purchase of {:.2} buys no valid credit amount", payment.amount))
                })?;
                self.grant_gift_credits(payment.user_id, credits).await
            }
        }
    }
}

pub fn spins_for_price(amount_cents: i64) -> Option<i32> {
    SPIN_PACKAGES
        .iter()
        .find(|(price, _)| *price == amount_cents)
        .map(|(_, spins)| *spins)
}

/// Whole credits bought by a gift purchase; fractions of a credit are dropped.
/// `None` when the purchase buys nothing or more than a balance can hold.
pub fn gift_credits_for_price(amount_cents: i64) -> Option<i32> {
    let credits = amount_cents.checked_mul(GIFT_CREDITS_PER_UNIT)? / 100;
    i32::try_from(credits).ok().filter(|credits| *credits > 0)
}
