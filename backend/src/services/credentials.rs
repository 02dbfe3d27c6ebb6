use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Turns a presented token into the user it was issued to.
#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn authenticate(&self, token: &str) -> AppResult<Uuid>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
}

/// HS256 tokens with the user id in `sub`.
pub struct JwtCredentials {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtCredentials {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `user_id`. Issuance belongs to the account service;
    /// this exists for tooling and tests.
    pub fn issue(&self, user_id: Uuid, ttl: Duration) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id,
            exp: (Utc::now() + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

#[async_trait]
impl CredentialService for JwtCredentials {
    async fn authenticate(&self, token: &str) -> AppResult<Uuid> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(e) => {
                debug!("Rejected token: {}", e);
                Err(AppError::Unauthenticated)
            }
        }
    }
}

/// Token from an `Authorization: Bearer …` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_issued_token_authenticates() {
        let credentials = JwtCredentials::new("test-secret");
        let user = Uuid::new_v4();
        let token = credentials.issue(user, Duration::hours(1)).unwrap();
        assert_eq!(credentials.authenticate(&token).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_expired_and_foreign_tokens_are_refused() {
        let credentials = JwtCredentials::new("test-secret");
        let user = Uuid::new_v4();

        let expired = credentials.issue(user, Duration::hours(-2)).unwrap();
        assert!(matches!(credentials.authenticate(&expired).await, Err(AppError::Unauthenticated)));

        let foreign = JwtCredentials::new("other-secret").issue(user, Duration::hours(1)).unwrap();
        assert!(matches!(credentials.authenticate(&foreign).await, Err(AppError::Unauthenticated)));

        assert!(matches!(credentials.authenticate("garbage").await, Err(AppError::Unauthenticated)));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
