use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{Page, Reply, Review};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Body of review create/update. `rating` may arrive as a number or as a
/// numeric string from form-encoded clients.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ReviewRequest {
    /// Integer value of `rating`; range is checked by the service.
    pub fn rating(&self) -> AppResult<i64> {
        let invalid = || AppError::validation("Rating must be between 1 and 5");
        match &self.rating {
            Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(i),
                (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e6 => Ok(f as i64),
                _ => Err(invalid()),
            },
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    #[serde(default)]
    pub text: String,
}

/// `?page&limit`. Unparseable or non-positive values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageQuery {
    pub fn resolve(&self) -> PageRequest {
        let parse = |v: &Option<String>| {
            v.as_deref()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|n| *n > 0)
        };
        PageRequest {
            page: parse(&self.page).unwrap_or(1),
            limit: parse(&self.limit).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        }
    }
}

impl PageRequest {
    pub fn window(&self) -> Page {
        Page {
            limit: self.limit,
            offset: (self.page - 1).saturating_mul(self.limit),
        }
    }

    pub fn info(&self, total: i64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: (total + self.limit - 1) / self.limit,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub id: Uuid,
    pub review_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub can_manage: bool,
}

impl ReplyView {
    pub fn new(r: Reply, can_manage: bool) -> Self {
        Self {
            id: r.id,
            review_id: r.review_id,
            user_id: r.user_id,
            user_email: r.user_email,
            text: r.text,
            created_at: r.created_at,
            can_manage,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub rating: i32,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub replies: Vec<ReplyView>,
    pub can_manage: bool,
}

impl ReviewView {
    pub fn new(r: Review, replies: Vec<ReplyView>, can_manage: bool) -> Self {
        Self {
            id: r.id,
            game_id: r.game_id,
            user_id: r.user_id,
            user_email: r.user_email,
            rating: r.rating,
            text: r.text,
            created_at: r.created_at,
            replies,
            can_manage,
        }
    }
}

/// A review on a user's profile page, with the game it belongs to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReviewView {
    pub id: Uuid,
    pub game_id: Uuid,
    pub game_title: Option<String>,
    pub game_image: Option<String>,
    pub user_id: Uuid,
    pub user_email: String,
    pub rating: i32,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub can_manage: bool,
}

#[derive(Debug, Serialize)]
pub struct ReviewPage<T> {
    pub reviews: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct SavedReviewResponse {
    pub message: &'static str,
    pub review: ReviewView,
}

#[derive(Debug, Serialize)]
pub struct SavedReplyResponse {
    pub message: &'static str,
    pub reply: ReplyView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rating(v: Value) -> AppResult<i64> {
        ReviewRequest {
            rating: Some(v),
            text: None,
        }
        .rating()
    }

    #[test]
    fn rating_accepts_integers_and_numeric_strings() {
        assert_eq!(rating(json!(4)).unwrap(), 4);
        assert_eq!(rating(json!("5")).unwrap(), 5);
        assert_eq!(rating(json!(3.0)).unwrap(), 3);
        assert_eq!(rating(json!(9)).unwrap(), 9);
    }

    #[test]
    fn rating_rejects_non_integers() {
        assert!(rating(json!(4.5)).is_err());
        assert!(rating(json!("four")).is_err());
        assert!(rating(json!(null)).is_err());
        assert!(ReviewRequest::default().rating().is_err());
    }

    #[test]
    fn page_query_defaults_and_caps() {
        let q = |page: Option<&str>, limit: Option<&str>| PageQuery {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        };
        assert_eq!(q(None, None).resolve(), PageRequest { page: 1, limit: 20 });
        assert_eq!(q(Some("3"), Some("500")).resolve(), PageRequest { page: 3, limit: 100 });
        assert_eq!(q(Some("0"), Some("abc")).resolve(), PageRequest { page: 1, limit: 20 });
        assert_eq!(q(Some("-2"), Some("5")).resolve(), PageRequest { page: 1, limit: 5 });
    }

    #[test]
    fn pagination_math() {
        let req = PageRequest { page: 2, limit: 10 };
        assert_eq!(req.window(), Page { limit: 10, offset: 10 });
        assert_eq!(req.info(0).pages, 0);
        assert_eq!(req.info(10).pages, 1);
        assert_eq!(req.info(11).pages, 2);
    }
}
