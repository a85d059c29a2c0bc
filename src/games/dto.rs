use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::ratings::GameStats;
use crate::store::Game;

/// A catalog entry as clients see it, aggregates included.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub id: Uuid,
    pub title: String,
    pub genre: String,
    pub description: String,
    pub image_url: String,
    pub avg_rating: f64,
    pub review_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl GameView {
    pub fn new(game: Game, stats: GameStats) -> Self {
        Self {
            id: game.id,
            title: game.title,
            genre: game.genre,
            description: game.description,
            image_url: game.image_url,
            avg_rating: stats.avg_rating,
            review_count: stats.review_count,
            created_at: game.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GamesResponse {
    pub games: Vec<GameView>,
}

#[derive(Debug, Serialize)]
pub struct GameResponse {
    pub game: GameView,
}

#[derive(Debug, Serialize)]
pub struct SavedGameResponse {
    pub message: &'static str,
    pub game: GameView,
}

/// Catalog fields as submitted, before validation.
#[derive(Debug, Default)]
pub struct GameInput {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
}
