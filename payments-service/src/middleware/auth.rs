//! Authenticated-user extractor.
//!
//! The managed auth provider fronts the site; requests reach this service
//! carrying its HS256 session JWT. The extractor verifies the signature
//! and expiry against the shared secret and exposes the token subject as
//! the caller's user id.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::startup::AppState;

/// Claims carried by the auth provider's session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!("Missing Authorization header"))
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::AuthError(anyhow::anyhow!("Authorization header is not a bearer token"))
        })?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.auth.jwt_secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            AppError::AuthError(anyhow::anyhow!("Token subject is not a user id"))
        })?;

        tracing::Span::current().record("user_id", data.claims.sub.as_str());

        Ok(AuthUser {
            user_id,
            email: data.claims.email,
        })
    }
}
