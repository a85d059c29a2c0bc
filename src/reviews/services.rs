use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{PageRequest, ReplyView, ReviewPage, ReviewView, UserReviewView};
use crate::{
    auth::policy::{can_manage_reply, can_manage_review, ensure, Actor},
    error::{AppError, AppResult},
    store::{Reply, Review, Store, User, ALREADY_REVIEWED},
};

const TEXT_MAX: usize = 2000;

fn check_rating(rating: i64) -> AppResult<i32> {
    match rating {
        1..=5 => Ok(rating as i32),
        _ => Err(AppError::validation("Rating must be between 1 and 5")),
    }
}

fn review_text(text: Option<String>) -> AppResult<String> {
    let text = text.as_deref().map(str::trim).unwrap_or_default();
    if text.chars().count() > TEXT_MAX {
        return Err(AppError::validation(
            "Review text must be less than 2000 characters",
        ));
    }
    Ok(text.to_string())
}

fn reply_text(text: &str) -> AppResult<String> {
    let text = text.trim();
    let len = text.chars().count();
    if len == 0 || len > TEXT_MAX {
        return Err(AppError::validation(
            "Reply text must be between 1 and 2000 characters",
        ));
    }
    Ok(text.to_string())
}

pub async fn add_review(
    store: &dyn Store,
    author: &User,
    game_id: Uuid,
    rating: i64,
    text: Option<String>,
) -> AppResult<Review> {
    let rating = check_rating(rating)?;
    let text = review_text(text)?;

    if store.find_game(game_id).await?.is_none() {
        return Err(AppError::NotFound("Game"));
    }
    if store.find_review_by_author(game_id, author.id).await?.is_some() {
        warn!(%game_id, user_id = %author.id, "duplicate review rejected");
        return Err(AppError::conflict(ALREADY_REVIEWED));
    }

    let review = Review {
        id: Uuid::new_v4(),
        game_id,
        user_id: author.id,
        user_email: author.email.clone(),
        rating,
        text,
        created_at: OffsetDateTime::now_utc(),
    };
    store.insert_review(&review).await?;
    info!(review_id = %review.id, %game_id, user_id = %author.id, rating, "review added");
    Ok(review)
}

pub async fn update_review(
    store: &dyn Store,
    user: &User,
    review_id: Uuid,
    rating: i64,
    text: Option<String>,
) -> AppResult<Review> {
    let rating = check_rating(rating)?;
    let text = review_text(text)?;

    let mut review = store
        .find_review(review_id)
        .await?
        .ok_or(AppError::NotFound("Review"))?;
    let actor = Actor::of(user);
    ensure(
        &actor,
        can_manage_review(&actor, &review),
        "Not authorized to edit this review",
    )?;

    store.update_review(review_id, rating, &text).await?;
    review.rating = rating;
    review.text = text;
    info!(%review_id, user_id = %user.id, "review updated");
    Ok(review)
}

pub async fn delete_review(store: &dyn Store, user: &User, review_id: Uuid) -> AppResult<()> {
    let review = store
        .find_review(review_id)
        .await?
        .ok_or(AppError::NotFound("Review"))?;
    let actor = Actor::of(user);
    ensure(
        &actor,
        can_manage_review(&actor, &review),
        "Not authorized to delete this review",
    )?;

    if !store.delete_review_cascade(review_id).await? {
        return Err(AppError::NotFound("Review"));
    }
    info!(%review_id, user_id = %user.id, "review deleted with its replies");
    Ok(())
}

pub async fn add_reply(
    store: &dyn Store,
    author: &User,
    review_id: Uuid,
    text: String,
) -> AppResult<Reply> {
    let text = reply_text(&text)?;
    if store.find_review(review_id).await?.is_none() {
        return Err(AppError::NotFound("Review"));
    }

    let reply = Reply {
        id: Uuid::new_v4(),
        review_id,
        user_id: author.id,
        user_email: author.email.clone(),
        text,
        created_at: OffsetDateTime::now_utc(),
    };
    store.insert_reply(&reply).await?;
    info!(reply_id = %reply.id, %review_id, user_id = %author.id, "reply added");
    Ok(reply)
}

pub async fn update_reply(
    store: &dyn Store,
    user: &User,
    reply_id: Uuid,
    text: String,
) -> AppResult<Reply> {
    let text = reply_text(&text)?;
    let mut reply = store
        .find_reply(reply_id)
        .await?
        .ok_or(AppError::NotFound("Reply"))?;
    let actor = Actor::of(user);
    ensure(
        &actor,
        can_manage_reply(&actor, &reply),
        "Not authorized to edit this reply",
    )?;

    store.update_reply(reply_id, &text).await?;
    reply.text = text;
    info!(%reply_id, user_id = %user.id, "reply updated");
    Ok(reply)
}

pub async fn delete_reply(store: &dyn Store, user: &User, reply_id: Uuid) -> AppResult<()> {
    let reply = store
        .find_reply(reply_id)
        .await?
        .ok_or(AppError::NotFound("Reply"))?;
    let actor = Actor::of(user);
    ensure(
        &actor,
        can_manage_reply(&actor, &reply),
        "Not authorized to delete this reply",
    )?;

    if !store.delete_reply(reply_id).await? {
        return Err(AppError::NotFound("Reply"));
    }
    info!(%reply_id, user_id = %user.id, "reply deleted");
    Ok(())
}

/// One page of a game's reviews, newest first, each with its replies.
pub async fn list_game_reviews(
    store: &dyn Store,
    actor: &Actor,
    game_id: Uuid,
    page: PageRequest,
) -> AppResult<ReviewPage<ReviewView>> {
    if store.find_game(game_id).await?.is_none() {
        return Err(AppError::NotFound("Game"));
    }

    let reviews = store.list_game_reviews(game_id, page.window()).await?;
    let total = store.count_game_reviews(game_id).await?;

    let ids: Vec<Uuid> = reviews.iter().map(|r| r.id).collect();
    let mut replies: HashMap<Uuid, Vec<ReplyView>> = HashMap::new();
    for reply in store.list_replies(&ids).await? {
        let can_manage = can_manage_reply(actor, &reply);
        replies
            .entry(reply.review_id)
            .or_default()
            .push(ReplyView::new(reply, can_manage));
    }

    let reviews = reviews
        .into_iter()
        .map(|r| {
            let can_manage = can_manage_review(actor, &r);
            let thread = replies.remove(&r.id).unwrap_or_default();
            ReviewView::new(r, thread, can_manage)
        })
        .collect();

    Ok(ReviewPage {
        reviews,
        pagination: page.info(total),
    })
}

/// One page of a user's reviews, newest first, with the reviewed game's
/// title and image (null once the game is gone).
pub async fn list_user_reviews(
    store: &dyn Store,
    actor: &Actor,
    user_id: Uuid,
    page: PageRequest,
) -> AppResult<ReviewPage<UserReviewView>> {
    let reviews = store.list_user_reviews(user_id, page.window()).await?;
    let total = store.count_user_reviews(user_id).await?;

    let mut game_ids: Vec<Uuid> = reviews.iter().map(|r| r.game_id).collect();
    game_ids.sort_unstable();
    game_ids.dedup();
    let games: HashMap<Uuid, _> = store
        .find_games(&game_ids)
        .await?
        .into_iter()
        .map(|g| (g.id, g))
        .collect();

    let reviews = reviews
        .into_iter()
        .map(|r| {
            let game = games.get(&r.game_id);
            UserReviewView {
                can_manage: can_manage_review(actor, &r),
                game_title: game.map(|g| g.title.clone()),
                game_image: game.map(|g| g.image_url.clone()),
                id: r.id,
                game_id: r.game_id,
                user_id: r.user_id,
                user_email: r.user_email,
                rating: r.rating,
                text: r.text,
                created_at: r.created_at,
            }
        })
        .collect();

    Ok(ReviewPage {
        reviews,
        pagination: page.info(total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Game, LocalStore, Role};

    fn user(email: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "x".into(),
            role,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    async fn seeded() -> (LocalStore, Game, User, User, User) {
        let store = LocalStore::in_memory();
        let alice = user("alice@x.com", Role::User);
        let bob = user("bob@x.com", Role::User);
        let admin = user("admin@x.com", Role::Admin);
        for u in [&alice, &bob, &admin] {
            store.insert_user(u).await.unwrap();
        }
        let game = Game {
            id: Uuid::new_v4(),
            title: "Hades".into(),
            genre: "Roguelike".into(),
            description: String::new(),
            image_url: "https://img/hades.png".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        store.insert_game(&game).await.unwrap();
        (store, game, alice, bob, admin)
    }

    fn first_page() -> PageRequest {
        PageRequest { page: 1, limit: 20 }
    }

    #[tokio::test]
    async fn review_then_reply_shows_up_in_listing() {
        let (store, game, alice, bob, _) = seeded().await;

        let review = add_review(&store, &alice, game.id, 4, Some("  solid  ".into()))
            .await
            .unwrap();
        assert_eq!(review.text, "solid");
        assert_eq!(review.user_email, "alice@x.com");

        add_reply(&store, &bob, review.id, "agreed".into()).await.unwrap();
        add_reply(&store, &alice, review.id, "thanks".into()).await.unwrap();

        let page = list_game_reviews(&store, &Actor::of(&bob), game.id, first_page())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.pagination.pages, 1);
        let listed = &page.reviews[0];
        assert_eq!(listed.rating, 4);
        assert!(!listed.can_manage);
        let texts: Vec<_> = listed.replies.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["agreed", "thanks"]);
        assert!(listed.replies[0].can_manage);
        assert!(!listed.replies[1].can_manage);
    }

    #[tokio::test]
    async fn one_review_per_user_per_game() {
        let (store, game, alice, bob, _) = seeded().await;
        add_review(&store, &alice, game.id, 5, None).await.unwrap();

        let again = add_review(&store, &alice, game.id, 3, None).await;
        assert!(matches!(again, Err(AppError::Conflict(ref m)) if m == ALREADY_REVIEWED));

        add_review(&store, &bob, game.id, 3, None).await.unwrap();
        assert_eq!(store.count_game_reviews(game.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn add_review_validates_before_writing() {
        let (store, game, alice, _, _) = seeded().await;
        for bad in [0, 6, -1] {
            assert!(matches!(
                add_review(&store, &alice, game.id, bad, None).await,
                Err(AppError::Validation(_))
            ));
        }
        assert!(matches!(
            add_review(&store, &alice, game.id, 3, Some("x".repeat(2001))).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            add_review(&store, &alice, Uuid::new_v4(), 3, None).await,
            Err(AppError::NotFound("Game"))
        ));
        assert_eq!(store.count_game_reviews(game.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn only_author_or_admin_may_change_a_review() {
        let (store, game, alice, bob, admin) = seeded().await;
        let review = add_review(&store, &alice, game.id, 2, Some("meh".into()))
            .await
            .unwrap();

        let denied = update_review(&store, &bob, review.id, 5, Some("great".into())).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        assert!(matches!(
            delete_review(&store, &bob, review.id).await,
            Err(AppError::Forbidden(_))
        ));
        let stored = store.find_review(review.id).await.unwrap().unwrap();
        assert_eq!((stored.rating, stored.text.as_str()), (2, "meh"));

        let updated = update_review(&store, &alice, review.id, 3, None).await.unwrap();
        assert_eq!(updated.rating, 3);
        assert_eq!(updated.text, "");
        assert_eq!(updated.created_at, review.created_at);

        let by_admin = update_review(&store, &admin, review.id, 1, Some("moderated".into()))
            .await
            .unwrap();
        assert_eq!(by_admin.user_id, alice.id);
        assert_eq!(by_admin.user_email, "alice@x.com");

        delete_review(&store, &admin, review.id).await.unwrap();
        assert!(matches!(
            delete_review(&store, &admin, review.id).await,
            Err(AppError::NotFound("Review"))
        ));
    }

    #[tokio::test]
    async fn reply_rules() {
        let (store, game, alice, bob, admin) = seeded().await;
        let review = add_review(&store, &alice, game.id, 5, None).await.unwrap();

        assert!(matches!(
            add_reply(&store, &bob, review.id, "   ".into()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            add_reply(&store, &bob, Uuid::new_v4(), "hi".into()).await,
            Err(AppError::NotFound("Review"))
        ));

        let reply = add_reply(&store, &bob, review.id, "hi".into()).await.unwrap();
        assert!(matches!(
            update_reply(&store, &alice, reply.id, "edited".into()).await,
            Err(AppError::Forbidden(_))
        ));
        let edited = update_reply(&store, &bob, reply.id, " edited ".into()).await.unwrap();
        assert_eq!(edited.text, "edited");
        assert_eq!(store.find_reply(reply.id).await.unwrap().unwrap().text, "edited");

        assert!(matches!(
            delete_reply(&store, &alice, reply.id).await,
            Err(AppError::Forbidden(_))
        ));
        delete_reply(&store, &admin, reply.id).await.unwrap();
        assert!(store.find_reply(reply.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_review_removes_its_replies() {
        let (store, game, alice, bob, _) = seeded().await;
        let review = add_review(&store, &alice, game.id, 5, None).await.unwrap();
        for i in 0..3 {
            add_reply(&store, &bob, review.id, format!("reply {i}")).await.unwrap();
        }
        delete_review(&store, &alice, review.id).await.unwrap();
        assert!(store.list_replies(&[review.id]).await.unwrap().is_empty());
        assert_eq!(store.count_game_reviews(game.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn game_listing_pages_newest_first() {
        let (store, game, ..) = seeded().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let u = user(&format!("u{i}@x.com"), Role::User);
            store.insert_user(&u).await.unwrap();
            ids.push(add_review(&store, &u, game.id, 3, None).await.unwrap().id);
        }

        let page = PageRequest { page: 2, limit: 2 };
        let listed = list_game_reviews(&store, &Actor::Anonymous, game.id, page)
            .await
            .unwrap();
        assert_eq!(listed.pagination.total, 5);
        assert_eq!(listed.pagination.pages, 3);
        let got: Vec<_> = listed.reviews.iter().map(|r| r.id).collect();
        assert_eq!(got, [ids[2], ids[1]]);
        assert!(listed.reviews.iter().all(|r| !r.can_manage));

        assert!(matches!(
            list_game_reviews(&store, &Actor::Anonymous, Uuid::new_v4(), first_page()).await,
            Err(AppError::NotFound("Game"))
        ));
    }

    #[tokio::test]
    async fn user_listing_carries_game_details() {
        let (store, game, alice, ..) = seeded().await;
        let other = Game {
            id: Uuid::new_v4(),
            title: "Celeste".into(),
            genre: "Platformer".into(),
            description: String::new(),
            image_url: "https://img/celeste.png".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        store.insert_game(&other).await.unwrap();
        add_review(&store, &alice, game.id, 5, None).await.unwrap();
        add_review(&store, &alice, other.id, 4, None).await.unwrap();

        let page = list_user_reviews(&store, &Actor::of(&alice), alice.id, first_page())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.reviews[0].game_title.as_deref(), Some("Celeste"));
        assert_eq!(page.reviews[1].game_image.as_deref(), Some("https://img/hades.png"));
        assert!(page.reviews.iter().all(|r| r.can_manage));

        let nobody = list_user_reviews(&store, &Actor::Anonymous, Uuid::new_v4(), first_page())
            .await
            .unwrap();
        assert!(nobody.reviews.is_empty());
        assert_eq!(nobody.pagination.pages, 0);
    }
}
