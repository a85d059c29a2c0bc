use std::{collections::HashMap, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    BannerSlot, Game, Page, RatingTotals, Reply, Review, Role, SiteSettings, Store, StoreError,
    StoreResult, User, ALREADY_REVIEWED, EMAIL_TAKEN,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    games: Vec<Game>,
    #[serde(default)]
    reviews: Vec<Review>,
    #[serde(default)]
    replies: Vec<Reply>,
    #[serde(default)]
    site: SiteSettings,
}

/// Process-local store. Every write is applied under one lock and, when a
/// path is configured, the whole snapshot is rewritten to disk.
pub struct LocalStore {
    path: Option<PathBuf>,
    data: RwLock<Snapshot>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(Snapshot::default()),
        }
    }

    pub async fn open(path: PathBuf) -> anyhow::Result<Self> {
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse store snapshot {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("read store snapshot {}", path.display()))
            }
        };
        info!(path = %path.display(), "local store opened");
        Ok(Self {
            path: Some(path),
            data: RwLock::new(snapshot),
        })
    }

    async fn persist(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot).context("serialize store snapshot")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("rename {} into place", tmp.display()))?;
        debug!(path = %path.display(), "local store persisted");
        Ok(())
    }

    /// Runs `f` on a copy of the snapshot under the write lock. The copy
    /// replaces the live snapshot only once it has been persisted.
    async fn write<T>(&self, f: impl FnOnce(&mut Snapshot) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Newest first; among equal timestamps the later-inserted record wins.
fn newest_first<T: Clone>(items: &[T], created_at: impl Fn(&T) -> OffsetDateTime) -> Vec<T> {
    let mut out: Vec<T> = items.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

fn window<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl Store for LocalStore {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let data = self.data.read().await;
        Ok(data.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let data = self.data.read().await;
        Ok(data
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        let data = self.data.read().await;
        Ok(data.users.iter().any(|u| u.role == Role::Admin))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.write(|data| {
            if data.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
                return Err(StoreError::Conflict(EMAIL_TAKEN.into()));
            }
            data.users.push(user.clone());
            Ok(())
        })
        .await
    }

    async fn update_account(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> StoreResult<()> {
        self.write(|data| {
            if let Some(email) = email {
                if data
                    .users
                    .iter()
                    .any(|u| u.id != user_id && u.email.eq_ignore_ascii_case(email))
                {
                    return Err(StoreError::Conflict(EMAIL_TAKEN.into()));
                }
                for u in data.users.iter_mut().filter(|u| u.id == user_id) {
                    u.email = email.to_string();
                }
                for r in data.reviews.iter_mut().filter(|r| r.user_id == user_id) {
                    r.user_email = email.to_string();
                }
                for r in data.replies.iter_mut().filter(|r| r.user_id == user_id) {
                    r.user_email = email.to_string();
                }
            }
            if let Some(hash) = password_hash {
                for u in data.users.iter_mut().filter(|u| u.id == user_id) {
                    u.password_hash = hash.to_string();
                }
            }
            Ok(())
        })
        .await
    }

    async fn list_games(&self, search: Option<&str>) -> StoreResult<Vec<Game>> {
        let data = self.data.read().await;
        let games = newest_first(&data.games, |g| g.created_at);
        Ok(match search {
            Some(q) => {
                let q = q.to_lowercase();
                games
                    .into_iter()
                    .filter(|g| {
                        contains_ci(&g.title, &q)
                            || contains_ci(&g.genre, &q)
                            || contains_ci(&g.description, &q)
                    })
                    .collect()
            }
            None => games,
        })
    }

    async fn find_game(&self, id: Uuid) -> StoreResult<Option<Game>> {
        let data = self.data.read().await;
        Ok(data.games.iter().find(|g| g.id == id).cloned())
    }

    async fn find_games(&self, ids: &[Uuid]) -> StoreResult<Vec<Game>> {
        let data = self.data.read().await;
        Ok(data
            .games
            .iter()
            .filter(|g| ids.contains(&g.id))
            .cloned()
            .collect())
    }

    async fn insert_game(&self, game: &Game) -> StoreResult<()> {
        self.write(|data| {
            data.games.push(game.clone());
            Ok(())
        })
        .await
    }

    async fn update_game(&self, game: &Game) -> StoreResult<()> {
        self.write(|data| {
            if let Some(existing) = data.games.iter_mut().find(|g| g.id == game.id) {
                existing.title = game.title.clone();
                existing.genre = game.genre.clone();
                existing.description = game.description.clone();
                existing.image_url = game.image_url.clone();
            }
            Ok(())
        })
        .await
    }

    async fn delete_game_cascade(&self, id: Uuid) -> StoreResult<bool> {
        self.write(|data| {
            if !data.games.iter().any(|g| g.id == id) {
                return Ok(false);
            }
            let review_ids: Vec<Uuid> = data
                .reviews
                .iter()
                .filter(|r| r.game_id == id)
                .map(|r| r.id)
                .collect();
            data.replies.retain(|r| !review_ids.contains(&r.review_id));
            data.reviews.retain(|r| r.game_id != id);
            data.games.retain(|g| g.id != id);
            Ok(true)
        })
        .await
    }

    async fn rating_totals(&self, game_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, RatingTotals>> {
        let data = self.data.read().await;
        let mut totals: HashMap<Uuid, RatingTotals> = HashMap::new();
        for r in data.reviews.iter().filter(|r| game_ids.contains(&r.game_id)) {
            let t = totals.entry(r.game_id).or_default();
            t.sum += i64::from(r.rating);
            t.count += 1;
        }
        Ok(totals)
    }

    async fn find_review(&self, id: Uuid) -> StoreResult<Option<Review>> {
        let data = self.data.read().await;
        Ok(data.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn find_review_by_author(&self, game_id: Uuid, user_id: Uuid) -> StoreResult<Option<Review>> {
        let data = self.data.read().await;
        Ok(data
            .reviews
            .iter()
            .find(|r| r.game_id == game_id && r.user_id == user_id)
            .cloned())
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.write(|data| {
            if data
                .reviews
                .iter()
                .any(|r| r.game_id == review.game_id && r.user_id == review.user_id)
            {
                return Err(StoreError::Conflict(ALREADY_REVIEWED.into()));
            }
            data.reviews.push(review.clone());
            Ok(())
        })
        .await
    }

    async fn update_review(&self, id: Uuid, rating: i32, text: &str) -> StoreResult<()> {
        self.write(|data| {
            if let Some(r) = data.reviews.iter_mut().find(|r| r.id == id) {
                r.rating = rating;
                r.text = text.to_string();
            }
            Ok(())
        })
        .await
    }

    async fn delete_review_cascade(&self, id: Uuid) -> StoreResult<bool> {
        self.write(|data| {
            if !data.reviews.iter().any(|r| r.id == id) {
                return Ok(false);
            }
            data.replies.retain(|r| r.review_id != id);
            data.reviews.retain(|r| r.id != id);
            Ok(true)
        })
        .await
    }

    async fn list_game_reviews(&self, game_id: Uuid, page: Page) -> StoreResult<Vec<Review>> {
        let data = self.data.read().await;
        let all = newest_first(&data.reviews, |r| r.created_at);
        Ok(window(
            all.into_iter().filter(|r| r.game_id == game_id).collect(),
            page,
        ))
    }

    async fn count_game_reviews(&self, game_id: Uuid) -> StoreResult<i64> {
        let data = self.data.read().await;
        Ok(data.reviews.iter().filter(|r| r.game_id == game_id).count() as i64)
    }

    async fn list_user_reviews(&self, user_id: Uuid, page: Page) -> StoreResult<Vec<Review>> {
        let data = self.data.read().await;
        let all = newest_first(&data.reviews, |r| r.created_at);
        Ok(window(
            all.into_iter().filter(|r| r.user_id == user_id).collect(),
            page,
        ))
    }

    async fn count_user_reviews(&self, user_id: Uuid) -> StoreResult<i64> {
        let data = self.data.read().await;
        Ok(data.reviews.iter().filter(|r| r.user_id == user_id).count() as i64)
    }

    async fn list_replies(&self, review_ids: &[Uuid]) -> StoreResult<Vec<Reply>> {
        let data = self.data.read().await;
        let mut out: Vec<Reply> = data
            .replies
            .iter()
            .filter(|r| review_ids.contains(&r.review_id))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn find_reply(&self, id: Uuid) -> StoreResult<Option<Reply>> {
        let data = self.data.read().await;
        Ok(data.replies.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_reply(&self, reply: &Reply) -> StoreResult<()> {
        self.write(|data| {
            data.replies.push(reply.clone());
            Ok(())
        })
        .await
    }

    async fn update_reply(&self, id: Uuid, text: &str) -> StoreResult<()> {
        self.write(|data| {
            if let Some(r) = data.replies.iter_mut().find(|r| r.id == id) {
                r.text = text.to_string();
            }
            Ok(())
        })
        .await
    }

    async fn delete_reply(&self, id: Uuid) -> StoreResult<bool> {
        self.write(|data| {
            let before = data.replies.len();
            data.replies.retain(|r| r.id != id);
            Ok(data.replies.len() != before)
        })
        .await
    }

    async fn site_settings(&self) -> StoreResult<SiteSettings> {
        Ok(self.data.read().await.site.clone())
    }

    async fn set_banner(&self, slot: BannerSlot, url: &str) -> StoreResult<SiteSettings> {
        self.write(|data| {
            data.site.set(slot, url.to_string());
            data.site.updated_at = Some(OffsetDateTime::now_utc());
            Ok(data.site.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn game(title: &str) -> Game {
        Game {
            id: Uuid::new_v4(),
            title: title.into(),
            genre: "Strategy".into(),
            description: String::new(),
            image_url: "https://img.local/x.png".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_insensitive() {
        let store = LocalStore::in_memory();
        store.insert_user(&user("a@x.com")).await.unwrap();
        let err = store.insert_user(&user("A@X.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_user_by_email("A@x.COM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_is_literal_and_case_insensitive() {
        let store = LocalStore::in_memory();
        store.insert_game(&game("Chess")).await.unwrap();
        store.insert_game(&game("Go (19x19)")).await.unwrap();
        let hits = store.list_games(Some("CHE")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Chess");
        let hits = store.list_games(Some("(19")).await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = store.list_games(Some("strat")).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn games_list_newest_first() {
        let store = LocalStore::in_memory();
        let mut older = game("Old");
        older.created_at -= time::Duration::hours(1);
        store.insert_game(&older).await.unwrap();
        store.insert_game(&game("New")).await.unwrap();
        let titles: Vec<_> = store
            .list_games(None)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = LocalStore::open(path.clone()).await.unwrap();
        let u = user("persist@x.com");
        store.insert_user(&u).await.unwrap();
        store.set_banner(BannerSlot::Left, "https://img.local/left.png").await.unwrap();
        drop(store);

        let reopened = LocalStore::open(path).await.unwrap();
        let found = reopened.find_user(u.id).await.unwrap().expect("user persisted");
        assert_eq!(found.email, "persist@x.com");
        let site = reopened.site_settings().await.unwrap();
        assert_eq!(site.left_banner_url.as_deref(), Some("https://img.local/left.png"));
        assert!(site.banner_url.is_none());
    }

    #[tokio::test]
    async fn failed_persist_leaves_snapshot_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let store = LocalStore::open(sub.join("store.json")).await.unwrap();
        let kept = user("kept@x.com");
        store.insert_user(&kept).await.unwrap();

        std::fs::remove_dir_all(&sub).unwrap();
        std::fs::write(&sub, b"not a directory").unwrap();

        let lost = user("lost@x.com");
        let err = store.insert_user(&lost).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.find_user(lost.id).await.unwrap().is_none());
        assert!(store.find_user(kept.id).await.unwrap().is_some());

        let err = store
            .update_account(kept.id, Some("renamed@x.com"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.find_user(kept.id).await.unwrap().unwrap().email, "kept@x.com");
    }

    #[tokio::test]
    async fn admin_exists_tracks_role() {
        let store = LocalStore::in_memory();
        store.insert_user(&user("member@x.com")).await.unwrap();
        assert!(!store.admin_exists().await.unwrap());
        let mut admin = user("root@x.com");
        admin.role = Role::Admin;
        store.insert_user(&admin).await.unwrap();
        assert!(store.admin_exists().await.unwrap());
    }

    #[tokio::test]
    async fn rating_totals_only_for_requested_games() {
        let store = LocalStore::in_memory();
        let (g1, g2) = (game("A"), game("B"));
        store.insert_game(&g1).await.unwrap();
        store.insert_game(&g2).await.unwrap();
        for (g, rating) in [(&g1, 4), (&g1, 5), (&g2, 1)] {
            store
                .insert_review(&Review {
                    id: Uuid::new_v4(),
                    game_id: g.id,
                    user_id: Uuid::new_v4(),
                    user_email: "r@x.com".into(),
                    rating,
                    text: String::new(),
                    created_at: OffsetDateTime::now_utc(),
                })
                .await
                .unwrap();
        }
        let totals = store.rating_totals(&[g1.id]).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[&g1.id], RatingTotals { sum: 9, count: 2 });
    }
}
