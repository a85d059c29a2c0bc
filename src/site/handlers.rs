use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;

use super::services;
use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    forms::read_form,
    state::AppState,
    store::{BannerSlot, SiteSettings},
};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/site", get(get_site))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/site/banner", post(upload_main_banner))
        .route("/site/banner/:slot", post(upload_slot_banner))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub banner_url: Option<String>,
    pub left_banner_url: Option<String>,
    pub right_banner_url: Option<String>,
}

impl From<SiteSettings> for SiteView {
    fn from(s: SiteSettings) -> Self {
        Self {
            banner_url: s.banner_url,
            left_banner_url: s.left_banner_url,
            right_banner_url: s.right_banner_url,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerResponse {
    pub message: &'static str,
    pub slot: BannerSlot,
    pub banner_url: String,
    pub site: SiteView,
}

#[instrument(skip(state))]
pub async fn get_site(State(state): State<AppState>) -> AppResult<Json<SiteView>> {
    let settings = services::get_site(state.store.as_ref()).await?;
    Ok(Json(settings.into()))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.0.id))]
pub async fn upload_main_banner(
    State(state): State<AppState>,
    user: CurrentUser,
    mp: Multipart,
) -> AppResult<Json<BannerResponse>> {
    upload(state, user, BannerSlot::Main, mp).await
}

#[instrument(skip(state, user, mp), fields(user_id = %user.0.id))]
pub async fn upload_slot_banner(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(slot): Path<String>,
    mp: Multipart,
) -> AppResult<Json<BannerResponse>> {
    let slot = services::parse_slot(&slot)?;
    upload(state, user, slot, mp).await
}

async fn upload(
    state: AppState,
    user: CurrentUser,
    slot: BannerSlot,
    mp: Multipart,
) -> AppResult<Json<BannerResponse>> {
    let image = read_form(mp).await?.take_file("banner");
    let (banner_url, settings) = services::upload_banner(
        state.store.as_ref(),
        state.media.as_ref(),
        &user.actor(),
        slot,
        image,
    )
    .await?;
    Ok(Json(BannerResponse {
        message: "Banner uploaded",
        slot,
        banner_url,
        site: settings.into(),
    }))
}
