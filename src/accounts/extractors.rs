use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::{JwtKeys, TokenKind};
use super::repo::AuthToken;
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller, accepted from either mechanism:
/// `Authorization: Bearer <jwt access>` or `Authorization: Token <opaque key>`.
pub struct AuthUser(pub Uuid);

fn auth_header(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = auth_header(parts)?;

        if let Some(token) = header.strip_prefix("Bearer ") {
            let keys = JwtKeys::from_ref(state);
            let claims = keys.verify(token).map_err(|_| {
                warn!("invalid or expired access token");
                ApiError::Unauthorized("invalid or expired token".into())
            })?;
            if claims.kind != TokenKind::Access {
                return Err(ApiError::Unauthorized("access token required".into()));
            }
            return Ok(AuthUser(claims.sub));
        }

        if let Some(key) = header.strip_prefix("Token ") {
            let row = AuthToken::find_by_key(&state.db, key)
                .await
                .map_err(ApiError::Internal)?
                .ok_or_else(|| ApiError::Unauthorized("invalid token".into()))?;
            return Ok(AuthUser(row.user_id));
        }

        Err(ApiError::Unauthorized("invalid auth scheme".into()))
    }
}

/// Caller authenticated specifically by opaque token, keeping the key so the
/// logout handler can delete the row it was authenticated with.
pub struct TokenUser {
    pub user_id: Uuid,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for TokenUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = auth_header(parts)?;
        let key = header
            .strip_prefix("Token ")
            .ok_or_else(|| ApiError::Unauthorized("token authentication required".into()))?;

        let row = AuthToken::find_by_key(&state.db, key)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::Unauthorized("invalid token".into()))?;

        Ok(TokenUser {
            user_id: row.user_id,
            token: row.token,
        })
    }
}
