use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{jwt::JwtKeys, policy::Actor};
use crate::{error::AppError, state::AppState, store::User};

/// Authenticated caller, loaded fresh from the store so role and email are
/// current.
pub struct CurrentUser(pub User);

/// Caller if a valid token was sent; anonymous otherwise.
pub struct MaybeUser(pub Option<User>);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor::of(&self.0)
    }
}

impl MaybeUser {
    pub fn actor(&self) -> Actor {
        Actor::from(self.0.as_ref())
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::unauthenticated("Invalid Authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(|t| Some(t.trim()))
        .ok_or_else(|| AppError::unauthenticated("Invalid Authorization header"))
}

async fn resolve(state: &AppState, token: &str) -> Result<User, AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        AppError::unauthenticated("Invalid or expired token")
    })?;
    state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthenticated("User not found"))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or_else(|| AppError::unauthenticated("Access token required"))?;
        Ok(CurrentUser(resolve(state, token).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Ok(Some(token)) = bearer_token(parts) else {
            return Ok(MaybeUser(None));
        };
        match resolve(state, token).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Internal(e)) => Err(AppError::Internal(e)),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}
