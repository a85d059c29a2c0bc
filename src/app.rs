use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::MediaBackend;
use crate::error::AppError;
use crate::state::AppState;
use crate::{auth, games, reviews, site};

async fn endpoint_not_found() -> AppError {
    AppError::NotFound("Endpoint")
}

async fn health() -> Json<Value> {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    Json(json!({ "status": "OK", "timestamp": timestamp }))
}

pub fn build_app(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;

    let mut app = Router::new().nest(
        "/api",
        Router::new()
            .merge(auth::router())
            .merge(games::router(max_upload))
            .merge(reviews::router())
            .merge(site::router(max_upload))
            .route("/health", get(health))
            .fallback(endpoint_not_found),
    );

    if let MediaBackend::Disk { dir } = &state.config.media {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
