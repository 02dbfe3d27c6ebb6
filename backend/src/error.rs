use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No spins left. Try again later or upgrade to VIP.")]
    NotEntitled,

    #[error("No matches found. Try again later or adjust your preferences.")]
    NoCandidates,

    #[error("This match is no longer available.")]
    NotFound,

    #[error("You are not part of this match.")]
    Forbidden,

    #[error("Unknown gift type.")]
    InvalidGift,

    #[error("Not enough gift credits.")]
    InsufficientCredits,

    #[error("Missing or invalid credentials.")]
    Unauthenticated,

    #[error("User not found.")]
    UserNotFound,

    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotEntitled => "not_entitled",
            AppError::NoCandidates => "no_candidates",
            AppError::NotFound => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::InvalidGift => "invalid_gift",
            AppError::InsufficientCredits => "insufficient_credits",
            AppError::Unauthenticated => "unauthenticated",
            AppError::UserNotFound => "user_not_found",
            AppError::InvalidPayment(_) => "invalid_payment",
            AppError::Store(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotEntitled | AppError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            AppError::NoCandidates | AppError::NotFound | AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidGift | AppError::InvalidPayment(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client. Storage failures are not echoed back.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Store(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Store(e) = &self {
            tracing::error!("Storage failure while handling request: {:#}", e);
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
        };

        (self.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotEntitled.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Store(anyhow::anyhow!("connection reset")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_are_not_leaked() {
        let err = AppError::Store(anyhow::anyhow!("password authentication failed for user \"app\""));
        assert!(!err.public_message().contains("password"));
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_stale_match_message() {
        assert_eq!(AppError::NotFound.public_message(), "This match is no longer available.");
    }
}
