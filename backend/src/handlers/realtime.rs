use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::{ClientEvent, ServerEvent},
    services::bearer_token,
};

#[derive(Debug, Deserialize)]
pub struct RealtimeParams {
    pub token: Option<String>,
}

/// `GET /ws`: verify the caller, then hand the socket to the session hub.
pub async fn realtime(
    State(state): State<AppState>,
    Query(params): Query<RealtimeParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers));
    let Some(token) = token else {
        return AppError::Unauthenticated.into_response();
    };
    let user_id = match state.credentials.authenticate(token).await {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| run_session(socket, state, user_id)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn run_session(socket: WebSocket, state: AppState, user_id: Uuid) {
    let handle = state.hub.connect(user_id).await;
    let session_id = handle.session_id;
    let mut events = handle.events;
    let (mut sender, mut receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode realtime event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        // Channel closed: the session was replaced or the hub dropped it.
        let _ = sender.send(Message::Close(None)).await;
    });

    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_frame(&reader_state, user_id, text.as_str()).await,
                Message::Ping(_) | Message::Pong(_) => reader_state.presence.touch(user_id),
                Message::Close(_) => break,
                Message::Binary(_) => {
                    debug!("Ignoring binary frame from {}", user_id);
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.hub.disconnect(user_id, session_id).await;
}

async fn handle_frame(state: &AppState, user_id: Uuid, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => state.hub.dispatch(user_id, event).await,
        Err(e) => {
            debug!("Unparseable realtime frame from {}: {}", user_id, e);
            state.hub.deliver(
                user_id,
                ServerEvent::Error {
                    code: "invalid_event".to_string(),
                    message: format!("Could not read event: {}", e),
                },
            );
        }
    }
}
