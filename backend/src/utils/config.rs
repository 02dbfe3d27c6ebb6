use anyhow::Result;
use std::env;
use crate::constants::{DEFAULT_SERVER_PORT, DEFAULT_STUN_SERVER};

#[derive(Debug, Clone)]
pub struct TurnServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub payment_webhook_secret: String,
    pub allowed_origins: Vec<String>,
    pub stun_server: String,
    pub turn_server: Option<TurnServer>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let turn_server = match env::var("WEBRTC_TURN_SERVER") {
            Ok(url) if !url.trim().is_empty() => Some(TurnServer {
                url,
                username: env::var("WEBRTC_TURN_USERNAME").unwrap_or_default(),
                credential: env::var("WEBRTC_TURN_PASSWORD").unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")
                .map_err(|_| anyhow::anyhow!("PAYMENT_WEBHOOK_SECRET must be set"))?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| parse_origins(&origins))
                .unwrap_or_default(),
            stun_server: env::var("WEBRTC_STUN_SERVER")
                .unwrap_or_else(|_| DEFAULT_STUN_SERVER.to_string()),
            turn_server,
        })
    }

    /// Config for tests and local tooling: in-memory store, permissive CORS.
    pub fn for_secrets(jwt_secret: &str, payment_webhook_secret: &str) -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            payment_webhook_secret: payment_webhook_secret.to_string(),
            allowed_origins: Vec::new(),
            stun_server: DEFAULT_STUN_SERVER.to_string(),
            turn_server: None,
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
