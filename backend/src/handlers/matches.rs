use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::{
    app::AppState,
    error::AppResult,
    models::{Connection, MatchPreferences, MatchProposal, User, UserStats},
};

#[derive(Debug, Default, Deserialize)]
pub struct SpinRequest {
    #[serde(default)]
    pub preferences: MatchPreferences,
}

/// What a spinner may see of the user they landed on.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Uuid,
    pub display_name: String,
    pub age: Option<i32>,
    pub interests: Vec<String>,
    pub is_vip: bool,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        let is_vip = user.vip_active(chrono::Utc::now());
        Self {
            id: user.id,
            display_name: user.display_name,
            age: user.age,
            interests: user.interests,
            is_vip,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinResponse {
    #[serde(rename = "match")]
    pub proposal: MatchProposal,
    pub matched_user: PublicProfile,
}

#[derive(Debug, Serialize)]
pub struct MatchList {
    pub matches: Vec<MatchProposal>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionList {
    pub connections: Vec<Connection>,
}

pub async fn spin(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Option<Json<SpinRequest>>,
) -> AppResult<Json<SpinResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let outcome = state.matching.spin(user_id, request.preferences).await?;

    Ok(Json(SpinResponse {
        proposal: outcome.proposal,
        matched_user: outcome.candidate.into(),
    }))
}

pub async fn accept_match(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Json<Connection>> {
    let connection = state.matching.accept(user_id, proposal_id).await?;
    Ok(Json(connection))
}

pub async fn reject_match(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Json<MatchProposal>> {
    let proposal = state.matching.reject(user_id, proposal_id).await?;
    Ok(Json(proposal))
}

pub async fn list_matches(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<MatchList>> {
    let matches = state.matching.list_matches(user_id).await?;
    Ok(Json(MatchList { matches }))
}

pub async fn list_connections(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ConnectionList>> {
    let connections = state.matching.list_connections(user_id).await?;
    Ok(Json(ConnectionList { connections }))
}

pub async fn get_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UserStats>> {
    Ok(Json(state.matching.stats(user_id).await?))
}
