//! Authentication utilities
//!
//! Provides:
//! - JWT token generation and validation
//! - User context extraction for axum handlers
//!
//! The user id taken from the token is only passed through; the store's
//! row-level security decides what that user can see.

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user (JWT subject)
    pub user_id: Uuid,

    /// Role claim, forwarded to the database session
    pub role: String,

    /// Request ID for tracing
    pub request_id: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "authenticated".to_string()
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
    request_id_header: String,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
            request_id_header: "x-request-id".to_string(),
        }
    }

    /// Build from configuration; a secret is mandatory
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret must be set".to_string(),
            })?;

        let mut manager = Self::new(secret, config.jwt_expiration_secs);
        manager.request_id_header = config.request_id_header.to_ascii_lowercase();
        Ok(manager)
    }

    /// Generate a new JWT token
    pub fn generate_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            role: default_role(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }

    /// Resolve a bearer token into an [`AuthContext`]
    pub fn authenticate(&self, token: &str, request_id: String) -> Result<AuthContext> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

        Ok(AuthContext {
            user_id,
            role: claims.role,
            request_id,
        })
    }
}

/// Extract the token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

/// Axum extractor for AuthContext
///
/// Browsers cannot set headers on WebSocket upgrades, so the token is also
/// accepted as an `access_token` query parameter.
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let jwt = Arc::<JwtManager>::from_ref(state);

        // Extract request ID
        let request_id = parts
            .headers
            .get(jwt.request_id_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let header_token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
            .map(String::from);

        let token = header_token
            .or_else(|| query_token(parts.uri.query()))
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing bearer token".to_string(),
            })?;

        jwt.authenticate(&token, request_id)
    }
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "access_token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
