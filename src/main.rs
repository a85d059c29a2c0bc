mod app;
mod auth;
mod config;
mod error;
mod extract;
mod forms;
mod games;
mod media;
mod reviews;
mod site;
mod state;
mod store;

use crate::{app::build_app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "gamereviews=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let state = AppState::init(config).await?;

    if let Err(e) = auth::services::bootstrap_admin(state.store.as_ref(), &state.config.admin).await {
        tracing::error!(error = %format!("{e:#}"), "admin bootstrap failed; continuing without one");
    }

    app::serve(build_app(state)).await
}
