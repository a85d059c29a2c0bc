use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        PageQuery, ReplyRequest, ReplyView, ReviewPage, ReviewRequest, ReviewView,
        SavedReplyResponse, SavedReviewResponse, UserReviewView,
    },
    services,
};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{CurrentUser, MaybeUser},
        policy::{can_manage_reply, Actor},
    },
    error::AppResult,
    extract::{parse_id, JsonBody},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews/game/:game_id", get(list_game_reviews))
        .route("/reviews/user/:user_id", get(list_user_reviews))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/reviews/game/:game_id", post(add_review))
        .route("/reviews/:id", put(update_review).delete(delete_review))
        .route("/reviews/:id/replies", post(add_reply))
        .route("/reviews/replies/:id", put(update_reply).delete(delete_reply))
}

#[instrument(skip(state, viewer))]
pub async fn list_game_reviews(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(game_id): Path<String>,
    Query(q): Query<PageQuery>,
) -> AppResult<Json<ReviewPage<ReviewView>>> {
    let game_id = parse_id(&game_id, "Game")?;
    let page =
        services::list_game_reviews(state.store.as_ref(), &viewer.actor(), game_id, q.resolve())
            .await?;
    Ok(Json(page))
}

#[instrument(skip(state, viewer))]
pub async fn list_user_reviews(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(user_id): Path<String>,
    Query(q): Query<PageQuery>,
) -> AppResult<Json<ReviewPage<UserReviewView>>> {
    let user_id = parse_id(&user_id, "User")?;
    let page =
        services::list_user_reviews(state.store.as_ref(), &viewer.actor(), user_id, q.resolve())
            .await?;
    Ok(Json(page))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn add_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(game_id): Path<String>,
    JsonBody(body): JsonBody<ReviewRequest>,
) -> AppResult<(StatusCode, Json<SavedReviewResponse>)> {
    let game_id = parse_id(&game_id, "Game")?;
    let rating = body.rating()?;
    let review = services::add_review(state.store.as_ref(), &user, game_id, rating, body.text).await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedReviewResponse {
            message: "Review added successfully",
            review: ReviewView::new(review, Vec::new(), true),
        }),
    ))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReviewRequest>,
) -> AppResult<Json<SavedReviewResponse>> {
    let id = parse_id(&id, "Review")?;
    let rating = body.rating()?;
    let review = services::update_review(state.store.as_ref(), &user, id, rating, body.text).await?;
    let actor = Actor::of(&user);
    let replies = state
        .store
        .list_replies(&[review.id])
        .await?
        .into_iter()
        .map(|r| {
            let can_manage = can_manage_reply(&actor, &r);
            ReplyView::new(r, can_manage)
        })
        .collect();
    Ok(Json(SavedReviewResponse {
        message: "Review updated successfully",
        review: ReviewView::new(review, replies, true),
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&id, "Review")?;
    services::delete_review(state.store.as_ref(), &user, id).await?;
    Ok(Json(MessageResponse {
        message: "Review deleted successfully",
    }))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn add_reply(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(review_id): Path<String>,
    JsonBody(body): JsonBody<ReplyRequest>,
) -> AppResult<(StatusCode, Json<SavedReplyResponse>)> {
    let review_id = parse_id(&review_id, "Review")?;
    let reply = services::add_reply(state.store.as_ref(), &user, review_id, body.text).await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedReplyResponse {
            message: "Reply added successfully",
            reply: ReplyView::new(reply, true),
        }),
    ))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update_reply(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReplyRequest>,
) -> AppResult<Json<SavedReplyResponse>> {
    let id = parse_id(&id, "Reply")?;
    let reply = services::update_reply(state.store.as_ref(), &user, id, body.text).await?;
    Ok(Json(SavedReplyResponse {
        message: "Reply updated successfully",
        reply: ReplyView::new(reply, true),
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_reply(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&id, "Reply")?;
    services::delete_reply(state.store.as_ref(), &user, id).await?;
    Ok(Json(MessageResponse {
        message: "Reply deleted successfully",
    }))
}
