use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    BannerSlot, Game, Page, RatingTotals, Reply, Review, Role, SiteSettings, Store, StoreError,
    StoreResult, User, ALREADY_REVIEWED, EMAIL_TAKEN,
};

/// Row shape of `users`; role is kept as text in the table.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            role: Role::parse(&r.role),
            created_at: r.created_at,
        }
    }
}

fn backend(e: sqlx::Error, what: &'static str) -> StoreError {
    StoreError::Backend(anyhow::Error::new(e).context(what))
}

fn unique_or_backend(e: sqlx::Error, what: &'static str, conflict: &str) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(conflict.to_string());
        }
    }
    backend(e, what)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, role, created_at";
const GAME_COLUMNS: &str = "id, title, genre, description, image_url, created_at";
const REVIEW_COLUMNS: &str = "id, game_id, user_id, user_email, rating, text, created_at";
const REPLY_COLUMNS: &str = "id, review_id, user_id, user_email, text, created_at";

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(e, "find user"))?;
        Ok(row.map(User::from))
    }

    #[instrument(skip(self))]
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(e, "find user by email"))?;
        Ok(row.map(User::from))
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend(e, "check admin exists"))
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_backend(e, "insert user", EMAIL_TAKEN))?;
        Ok(())
    }

    #[instrument(skip(self, password_hash))]
    async fn update_account(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| backend(e, "begin tx"))?;

        if let Some(email) = email {
            sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
                .bind(user_id)
                .bind(email)
                .execute(&mut *tx)
                .await
                .map_err(|e| unique_or_backend(e, "update user email", EMAIL_TAKEN))?;
            sqlx::query("UPDATE reviews SET user_email = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(email)
                .execute(&mut *tx)
                .await
                .map_err(|e| backend(e, "propagate email to reviews"))?;
            sqlx::query("UPDATE replies SET user_email = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(email)
                .execute(&mut *tx)
                .await
                .map_err(|e| backend(e, "propagate email to replies"))?;
        }

        if let Some(hash) = password_hash {
            sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                .bind(user_id)
                .bind(hash)
                .execute(&mut *tx)
                .await
                .map_err(|e| backend(e, "update password"))?;
        }

        tx.commit().await.map_err(|e| backend(e, "commit tx"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_games(&self, search: Option<&str>) -> StoreResult<Vec<Game>> {
        let rows = match search {
            Some(q) => {
                sqlx::query_as::<_, Game>(&format!(
                    r#"
                    SELECT {GAME_COLUMNS}
                    FROM games
                    WHERE strpos(lower(title), lower($1)) > 0
                       OR strpos(lower(genre), lower($1)) > 0
                       OR strpos(lower(description), lower($1)) > 0
                    ORDER BY created_at DESC
                    "#
                ))
                .bind(q)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Game>(&format!(
                    "SELECT {GAME_COLUMNS} FROM games ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        };
        rows.map_err(|e| backend(e, "list games"))
    }

    async fn find_game(&self, id: Uuid) -> StoreResult<Option<Game>> {
        sqlx::query_as::<_, Game>(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend(e, "find game"))
    }

    async fn find_games(&self, ids: &[Uuid]) -> StoreResult<Vec<Game>> {
        sqlx::query_as::<_, Game>(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(e, "find games"))
    }

    #[instrument(skip(self, game), fields(game_id = %game.id))]
    async fn insert_game(&self, game: &Game) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO games (id, title, genre, description, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(game.id)
        .bind(&game.title)
        .bind(&game.genre)
        .bind(&game.description)
        .bind(&game.image_url)
        .bind(game.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| backend(e, "insert game"))?;
        Ok(())
    }

    #[instrument(skip(self, game), fields(game_id = %game.id))]
    async fn update_game(&self, game: &Game) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE games
               SET title = $2, genre = $3, description = $4, image_url = $5
             WHERE id = $1
            "#,
        )
        .bind(game.id)
        .bind(&game.title)
        .bind(&game.genre)
        .bind(&game.description)
        .bind(&game.image_url)
        .execute(&self.pool)
        .await
        .map_err(|e| backend(e, "update game"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_game_cascade(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| backend(e, "begin tx"))?;

        sqlx::query(
            "DELETE FROM replies WHERE review_id IN (SELECT id FROM reviews WHERE game_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend(e, "delete game replies"))?;
        sqlx::query("DELETE FROM reviews WHERE game_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(e, "delete game reviews"))?;
        let res = sqlx::query("DELETE FROM games WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(e, "delete game"))?;

        tx.commit().await.map_err(|e| backend(e, "commit tx"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn rating_totals(&self, game_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, RatingTotals>> {
        if game_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, i64, i64)>(
            r#"
            SELECT game_id, SUM(rating)::BIGINT, COUNT(*)
              FROM reviews
             WHERE game_id = ANY($1)
             GROUP BY game_id
            "#,
        )
        .bind(game_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(e, "rating totals"))?;

        Ok(rows
            .into_iter()
            .map(|(id, sum, count)| (id, RatingTotals { sum, count }))
            .collect())
    }

    async fn find_review(&self, id: Uuid) -> StoreResult<Option<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(e, "find review"))
    }

    async fn find_review_by_author(&self, game_id: Uuid, user_id: Uuid) -> StoreResult<Option<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE game_id = $1 AND user_id = $2"
        ))
        .bind(game_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(e, "find review by author"))
    }

    #[instrument(skip(self, review), fields(review_id = %review.id))]
    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, game_id, user_id, user_email, rating, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.game_id)
        .bind(review.user_id)
        .bind(&review.user_email)
        .bind(review.rating)
        .bind(&review.text)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_backend(e, "insert review", ALREADY_REVIEWED))?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn update_review(&self, id: Uuid, rating: i32, text: &str) -> StoreResult<()> {
        sqlx::query("UPDATE reviews SET rating = $2, text = $3 WHERE id = $1")
            .bind(id)
            .bind(rating)
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(e, "update review"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_review_cascade(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| backend(e, "begin tx"))?;
        sqlx::query("DELETE FROM replies WHERE review_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(e, "delete review replies"))?;
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend(e, "delete review"))?;
        tx.commit().await.map_err(|e| backend(e, "commit tx"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_game_reviews(&self, game_id: Uuid, page: Page) -> StoreResult<Vec<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE game_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(game_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(e, "list game reviews"))
    }

    async fn count_game_reviews(&self, game_id: Uuid) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE game_id = $1")
            .bind(game_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend(e, "count game reviews"))
    }

    async fn list_user_reviews(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Review>> {
        sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(e, "list user reviews"))
    }

    async fn count_user_reviews(&self, user_id: Uuid) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend(e, "count user reviews"))
    }

    async fn list_replies(&self, review_ids: &[Uuid]) -> StoreResult<Vec<Reply>> {
        if review_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Reply>(&format!(
            r#"
            SELECT {REPLY_COLUMNS}
            FROM replies
            WHERE review_id = ANY($1)
            ORDER BY created_at ASC
            "#
        ))
        .bind(review_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend(e, "list replies"))
    }

    async fn find_reply(&self, id: Uuid) -> StoreResult<Option<Reply>> {
        sqlx::query_as::<_, Reply>(&format!(
            "SELECT {REPLY_COLUMNS} FROM replies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(e, "find reply"))
    }

    #[instrument(skip(self, reply), fields(reply_id = %reply.id))]
    async fn insert_reply(&self, reply: &Reply) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO replies (id, review_id, user_id, user_email, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reply.id)
        .bind(reply.review_id)
        .bind(reply.user_id)
        .bind(&reply.user_email)
        .bind(&reply.text)
        .bind(reply.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| backend(e, "insert reply"))?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn update_reply(&self, id: Uuid, text: &str) -> StoreResult<()> {
        sqlx::query("UPDATE replies SET text = $2 WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(e, "update reply"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_reply(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM replies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend(e, "delete reply"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn site_settings(&self) -> StoreResult<SiteSettings> {
        let row = sqlx::query_as::<_, SiteSettings>(
            r#"
            SELECT banner_url, left_banner_url, right_banner_url, updated_at
            FROM site_settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(e, "load site settings"))?;
        Ok(row.unwrap_or_default())
    }

    #[instrument(skip(self, url))]
    async fn set_banner(&self, slot: BannerSlot, url: &str) -> StoreResult<SiteSettings> {
        let column = match slot {
            BannerSlot::Main => "banner_url",
            BannerSlot::Left => "left_banner_url",
            BannerSlot::Right => "right_banner_url",
        };
        sqlx::query_as::<_, SiteSettings>(&format!(
            r#"
            INSERT INTO site_settings (id, {column}, updated_at)
            VALUES (1, $1, now())
            ON CONFLICT (id) DO UPDATE SET {column} = EXCLUDED.{column}, updated_at = now()
            RETURNING banner_url, left_banner_url, right_banner_url, updated_at
            "#
        ))
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| backend(e, "set banner"))
    }
}
