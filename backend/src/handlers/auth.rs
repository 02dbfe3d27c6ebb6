use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{app::AppState, error::AppError, services::bearer_token};

/// The caller's user id, taken from a verified bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthenticated)?;
        let user_id = state.credentials.authenticate(token).await?;
        state.presence.touch(user_id);
        Ok(AuthUser(user_id))
    }
}
