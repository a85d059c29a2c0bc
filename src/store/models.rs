use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Unknown values fall back to the unprivileged role.
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String, // argon2 PHC string
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: Uuid,
    pub title: String,
    pub genre: String,
    pub description: String,
    pub image_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub rating: i32,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reply {
    pub id: Uuid,
    pub review_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerSlot {
    Main,
    Left,
    Right,
}

impl BannerSlot {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(BannerSlot::Main),
            "left" => Some(BannerSlot::Left),
            "right" => Some(BannerSlot::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BannerSlot::Main => "main",
            BannerSlot::Left => "left",
            BannerSlot::Right => "right",
        }
    }
}

/// Singleton site-wide settings record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct SiteSettings {
    pub banner_url: Option<String>,
    pub left_banner_url: Option<String>,
    pub right_banner_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl SiteSettings {
    pub fn set(&mut self, slot: BannerSlot, url: String) {
        match slot {
            BannerSlot::Main => self.banner_url = Some(url),
            BannerSlot::Left => self.left_banner_url = Some(url),
            BannerSlot::Right => self.right_banner_url = Some(url),
        }
    }
}

/// Sum and count of one game's ratings, as fetched by the batch query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingTotals {
    pub sum: i64,
    pub count: i64,
}

/// Limit/offset window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}
