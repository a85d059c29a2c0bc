use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{GameInput, GameResponse, GamesResponse, SavedGameResponse},
    services,
};
use crate::{
    auth::{dto::MessageResponse, extractors::CurrentUser},
    error::AppResult,
    extract::parse_id,
    forms::{read_form, Form},
    media::Upload,
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/games", get(list_games))
        .route("/games/:id", get(get_game))
        .route("/games/search/:query", get(search_games))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/:id", put(update_game).delete(delete_game))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

fn game_form(mut form: Form) -> (GameInput, Option<Upload>) {
    let image = form.take_file("image");
    let input = GameInput {
        title: form.text("title").map(str::to_string),
        genre: form.text("genre").map(str::to_string),
        description: form.text("description").map(str::to_string),
    };
    (input, image)
}

#[instrument(skip(state))]
pub async fn list_games(State(state): State<AppState>) -> AppResult<Json<GamesResponse>> {
    let games = services::list_games(state.store.as_ref()).await?;
    Ok(Json(GamesResponse { games }))
}

#[instrument(skip(state))]
pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<GameResponse>> {
    let id = parse_id(&id, "Game")?;
    let game = services::get_game(state.store.as_ref(), id).await?;
    Ok(Json(GameResponse { game }))
}

#[instrument(skip(state))]
pub async fn search_games(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> AppResult<Json<GamesResponse>> {
    let games = services::search_games(state.store.as_ref(), &query).await?;
    Ok(Json(GamesResponse { games }))
}

#[instrument(skip_all, fields(user_id = %user.0.id))]
pub async fn create_game(
    State(state): State<AppState>,
    user: CurrentUser,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<SavedGameResponse>)> {
    let (input, image) = game_form(read_form(mp).await?);
    let game = services::create_game(
        state.store.as_ref(),
        state.media.as_ref(),
        &user.actor(),
        input,
        image,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedGameResponse {
            message: "Game created successfully",
            game,
        }),
    ))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.0.id))]
pub async fn update_game(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mp: Multipart,
) -> AppResult<Json<SavedGameResponse>> {
    let id = parse_id(&id, "Game")?;
    let (input, image) = game_form(read_form(mp).await?);
    let game = services::update_game(
        state.store.as_ref(),
        state.media.as_ref(),
        &user.actor(),
        id,
        input,
        image,
    )
    .await?;
    Ok(Json(SavedGameResponse {
        message: "Game updated successfully",
        game,
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn delete_game(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&id, "Game")?;
    services::delete_game(state.store.as_ref(), state.media.as_ref(), &user.actor(), id).await?;
    Ok(Json(MessageResponse {
        message: "Game deleted successfully",
    }))
}
