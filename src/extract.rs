//! Request extractors that reject with `AppError`, so malformed input gets
//! the same `{"error": ...}` body as every other failure.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// JSON request body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            debug!(rejection = %e.body_text(), "rejected json body");
            match e {
                JsonRejection::MissingJsonContentType(_) => {
                    AppError::validation("Content-Type must be application/json")
                }
                JsonRejection::JsonDataError(_) => AppError::validation("Invalid request body"),
                _ => AppError::validation("Invalid JSON in request body"),
            }
        })?;
        Ok(JsonBody(value))
    }
}

/// Ids arrive as raw path segments; one that is not a UUID names no record.
pub fn parse_id(raw: &str, resource: &'static str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(resource))
}
