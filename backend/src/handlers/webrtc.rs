use axum::{extract::State, response::Json};
use serde::Serialize;

use super::auth::AuthUser;
use crate::{app::AppState, services::generate_room_id, utils::Config};

#[derive(Debug, Serialize)]
pub struct IceServer {
    pub urls: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcConfig {
    pub ice_servers: Vec<IceServer>,
    pub room_id: String,
}

pub fn ice_servers(config: &Config) -> Vec<IceServer> {
    let mut servers = vec![IceServer {
        urls: config.stun_server.clone(),
        username: None,
        credential: None,
    }];
    if let Some(turn) = &config.turn_server {
        servers.push(IceServer {
            urls: turn.url.clone(),
            username: Some(turn.username.clone()),
            credential: Some(turn.credential.clone()),
        });
    }
    servers
}

pub async fn webrtc_config(State(state): State<AppState>, AuthUser(_): AuthUser) -> Json<WebRtcConfig> {
    Json(WebRtcConfig {
        ice_servers: ice_servers(&state.config),
        room_id: generate_room_id(),
    })
}
