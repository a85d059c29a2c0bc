use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{
        AccountResponse, AccountUpdateRequest, AuthResponse, CredentialsRequest, MeResponse,
        MessageResponse,
    },
    extractors::CurrentUser,
    jwt::JwtKeys,
    services,
};
use crate::{error::AppResult, extract::JsonBody, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/account", put(update_account))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let keys = JwtKeys::from_ref(&state);
    let session = services::signup(state.store.as_ref(), &keys, &payload.email, &payload.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully",
            user: session.user.into(),
            token: session.token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let session = services::login(state.store.as_ref(), &keys, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        user: session.user.into(),
        token: session.token,
    }))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse { user: user.into() })
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<AccountUpdateRequest>,
) -> AppResult<Json<AccountResponse>> {
    let updated = services::update_account(state.store.as_ref(), &user, payload).await?;
    Ok(Json(AccountResponse {
        message: "Account updated successfully",
        user: updated.into(),
    }))
}

/// Tokens are stateless; the client drops its copy.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<MessageResponse> {
    info!("user logged out");
    Json(MessageResponse {
        message: "Logout successful",
    })
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::auth::dto::PublicUser;
    use crate::store::Role;

    #[test]
    fn public_user_serialization_hides_hash() {
        let response = MeResponse {
            user: PublicUser {
                id: uuid::Uuid::new_v4(),
                email: "test@example.com".to_string(),
                role: Role::Admin,
                created_at: time::OffsetDateTime::now_utc(),
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["user"]["email"], "test@example.com");
        assert_eq!(json["user"]["role"], "admin");
        assert!(json["user"].get("createdAt").is_some());
        assert!(json["user"].get("passwordHash").is_none());
        assert!(json["user"].get("password_hash").is_none());
    }
}
