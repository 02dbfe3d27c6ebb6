use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde::Serialize;
use tracing::warn;

use crate::{
    app::AppState,
    constants::PAYMENT_SECRET_HEADER,
    error::{AppError, AppResult},
    models::PaymentCompletion,
};

#[derive(Debug, Serialize)]
pub struct PaymentApplied {
    pub success: bool,
}

/// Completed payments from the payment provider's webhook relay.
pub async fn payment_completed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payment): Json<PaymentCompletion>,
) -> AppResult<Json<PaymentApplied>> {
    let presented = headers
        .get(PAYMENT_SECRET_HEADER)
        .map(|value| value.as_bytes())
        .unwrap_or_default();
    if !secrets_match(presented, state.config.payment_webhook_secret.as_bytes()) {
        warn!("Payment completion for user {} refused: bad secret", payment.user_id);
        return Err(AppError::Unauthenticated);
    }

    state.ledger.apply_payment(&payment).await?;
    Ok(Json(PaymentApplied { success: true }))
}

/// Byte comparison whose timing does not depend on where the inputs differ.
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(b"hook-secret", b"hook-secret"));
        assert!(!secrets_match(b"hook-secreT", b"hook-secret"));
        assert!(!secrets_match(b"hook", b"hook-secret"));
        assert!(!secrets_match(b"", b"hook-secret"));
    }
}
