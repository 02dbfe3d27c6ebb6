use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    db::Store,
    handlers,
    services::{CredentialService, EntitlementLedger, JwtCredentials, MatchService, PresenceTracker, SessionHub},
    utils::Config,
};

/// Everything a request handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub ledger: EntitlementLedger,
    pub matching: MatchService,
    pub presence: Arc<PresenceTracker>,
    pub hub: Arc<SessionHub>,
    pub credentials: Arc<dyn CredentialService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let credentials = Arc::new(JwtCredentials::new(&config.jwt_secret));
        Self::with_credentials(store, config, credentials)
    }

    pub fn with_credentials(
        store: Arc<dyn Store>,
        config: Config,
        credentials: Arc<dyn CredentialService>,
    ) -> Self {
        let ledger = EntitlementLedger::new(store.clone());
        let matching = MatchService::new(store.clone(), ledger.clone());
        let presence = Arc::new(PresenceTracker::new(store.clone()));
        let hub = Arc::new(SessionHub::new(store.clone(), ledger.clone(), presence.clone()));

        Self {
            store,
            ledger,
            matching,
            presence,
            hub,
            credentials,
            config: Arc::new(config),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors_layer = create_cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        // Spins and the proposal lifecycle
        .route("/api/vip/spin", post(handlers::spin))
        .route("/api/vip/matches", get(handlers::list_matches))
        .route("/api/vip/matches/{id}/accept", post(handlers::accept_match))
        .route("/api/vip/matches/{id}/reject", post(handlers::reject_match))
        .route("/api/vip/connections", get(handlers::list_connections))
        .route("/api/vip/stats", get(handlers::get_stats))
        // Presence
        .route("/api/presence/online", get(handlers::online_users))
        .route("/api/presence/{user_id}", get(handlers::user_status))
        // Calls and payments
        .route("/api/webrtc/config", get(handlers::webrtc_config))
        .route("/api/payments/completed", post(handlers::payment_completed))
        // Realtime channel
        .route("/ws", get(handlers::realtime))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        // Default to permissive for development
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

async fn health_check() -> &'static str {
    "OK"
}
