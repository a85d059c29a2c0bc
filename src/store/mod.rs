//! Persistence behind one trait, with a Postgres backend and a local
//! (in-memory, optionally file-backed) backend picked at startup.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod local;
pub mod models;
pub mod postgres;

pub use local::LocalStore;
pub use models::{BannerSlot, Game, Page, RatingTotals, Reply, Review, Role, SiteSettings, User};
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness invariant would be broken by the write.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub const EMAIL_TAKEN: &str = "Email already in use";
pub const ALREADY_REVIEWED: &str = "You have already reviewed this game";

#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn admin_exists(&self) -> StoreResult<bool>;

    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Applies an email and/or password change as one unit. A new email is
    /// also rewritten on every review and reply the user authored.
    async fn update_account(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> StoreResult<()>;

    // ---- games ----

    /// Newest first. `search` is a case-insensitive literal substring matched
    /// against title, genre and description.
    async fn list_games(&self, search: Option<&str>) -> StoreResult<Vec<Game>>;

    async fn find_game(&self, id: Uuid) -> StoreResult<Option<Game>>;

    async fn find_games(&self, ids: &[Uuid]) -> StoreResult<Vec<Game>>;

    async fn insert_game(&self, game: &Game) -> StoreResult<()>;

    async fn update_game(&self, game: &Game) -> StoreResult<()>;

    /// Deletes replies of the game's reviews, the reviews, then the game.
    /// Returns false when the game did not exist.
    async fn delete_game_cascade(&self, id: Uuid) -> StoreResult<bool>;

    /// Rating sum/count for each of `game_ids` that has at least one review.
    async fn rating_totals(&self, game_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, RatingTotals>>;

    // ---- reviews ----

    async fn find_review(&self, id: Uuid) -> StoreResult<Option<Review>>;

    async fn find_review_by_author(&self, game_id: Uuid, user_id: Uuid) -> StoreResult<Option<Review>>;

    async fn insert_review(&self, review: &Review) -> StoreResult<()>;

    async fn update_review(&self, id: Uuid, rating: i32, text: &str) -> StoreResult<()>;

    /// Deletes the review's replies, then the review.
    async fn delete_review_cascade(&self, id: Uuid) -> StoreResult<bool>;

    /// Newest first.
    async fn list_game_reviews(&self, game_id: Uuid, page: Page) -> StoreResult<Vec<Review>>;

    async fn count_game_reviews(&self, game_id: Uuid) -> StoreResult<i64>;

    /// Newest first.
    async fn list_user_reviews(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Review>>;

    async fn count_user_reviews(&self, user_id: Uuid) -> StoreResult<i64>;

    // ---- replies ----

    /// Replies of the given reviews, oldest first.
    async fn list_replies(&self, review_ids: &[Uuid]) -> StoreResult<Vec<Reply>>;

    async fn find_reply(&self, id: Uuid) -> StoreResult<Option<Reply>>;

    async fn insert_reply(&self, reply: &Reply) -> StoreResult<()>;

    async fn update_reply(&self, id: Uuid, text: &str) -> StoreResult<()>;

    async fn delete_reply(&self, id: Uuid) -> StoreResult<bool>;

    // ---- site ----

    async fn site_settings(&self) -> StoreResult<SiteSettings>;

    async fn set_banner(&self, slot: BannerSlot, url: &str) -> StoreResult<SiteSettings>;
}
