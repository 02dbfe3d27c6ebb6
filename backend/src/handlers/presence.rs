use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::{app::AppState, error::AppResult, services::PresenceStatus};

#[derive(Debug, Serialize)]
pub struct OnlineUsers {
    pub users: Vec<Uuid>,
    pub count: usize,
}

pub async fn online_users(State(state): State<AppState>, AuthUser(_): AuthUser) -> Json<OnlineUsers> {
    let users = state.presence.online_users();
    Json(OnlineUsers {
        count: users.len(),
        users,
    })
}

pub async fn user_status(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<PresenceStatus>> {
    Ok(Json(state.presence.status(user_id).await?))
}
