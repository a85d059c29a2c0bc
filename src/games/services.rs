use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{GameInput, GameView},
    ratings::{stats_for, with_stats, GameStats},
};
use crate::{
    auth::policy::{can_manage_catalog, ensure, Actor},
    error::{AppError, AppResult},
    media::{store_image, MediaStorage, Upload},
    store::{Game, RatingTotals, Store},
};

const TITLE_MAX: usize = 200;
const GENRE_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 2000;

const ADMIN_REQUIRED: &str = "Admin access required";

struct ValidGame {
    title: String,
    genre: String,
    description: String,
}

fn required(value: Option<&str>, field: &str, max: usize) -> AppResult<String> {
    let v = value.map(str::trim).unwrap_or_default();
    let len = v.chars().count();
    if len == 0 || len > max {
        return Err(AppError::validation(format!(
            "{field} must be between 1 and {max} characters"
        )));
    }
    Ok(v.to_string())
}

fn validate(input: &GameInput) -> AppResult<ValidGame> {
    let title = required(input.title.as_deref(), "Title", TITLE_MAX)?;
    let genre = required(input.genre.as_deref(), "Genre", GENRE_MAX)?;
    let description = input.description.as_deref().map(str::trim).unwrap_or_default();
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(AppError::validation(format!(
            "Description must be less than {DESCRIPTION_MAX} characters"
        )));
    }
    Ok(ValidGame {
        title,
        genre,
        description: description.to_string(),
    })
}

/// Stand-in cover for games created without an image. Stable per title.
pub fn placeholder_image_url(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "game" } else { slug };
    format!("https://picsum.photos/seed/{slug}/640/360")
}

/// Best effort; a failed delete leaves an orphaned object, not a broken game.
async fn discard_image(media: &dyn MediaStorage, url: &str) {
    let Some(key) = media.key_for_url(url) else {
        return;
    };
    if let Err(e) = media.delete_object(&key).await {
        warn!(error = %format!("{e:#}"), %key, "failed to delete game image");
    }
}

pub async fn list_games(store: &dyn Store) -> AppResult<Vec<GameView>> {
    let games = store.list_games(None).await?;
    views(store, games).await
}

pub async fn search_games(store: &dyn Store, query: &str) -> AppResult<Vec<GameView>> {
    let query = query.trim();
    if query.is_empty() {
        return list_games(store).await;
    }
    let games = store.list_games(Some(query)).await?;
    views(store, games).await
}

async fn views(store: &dyn Store, games: Vec<Game>) -> AppResult<Vec<GameView>> {
    Ok(with_stats(store, games)
        .await?
        .into_iter()
        .map(|(g, s)| GameView::new(g, s))
        .collect())
}

pub async fn get_game(store: &dyn Store, id: Uuid) -> AppResult<GameView> {
    let game = store.find_game(id).await?.ok_or(AppError::NotFound("Game"))?;
    let stats = stats_for(store, id).await?;
    Ok(GameView::new(game, stats))
}

pub async fn create_game(
    store: &dyn Store,
    media: &dyn MediaStorage,
    actor: &Actor,
    input: GameInput,
    image: Option<Upload>,
) -> AppResult<GameView> {
    ensure(actor, can_manage_catalog(actor), ADMIN_REQUIRED)?;
    let valid = validate(&input)?;

    let image_url = match image {
        Some(upload) => store_image(media, "games", upload).await?,
        None => placeholder_image_url(&valid.title),
    };

    let game = Game {
        id: Uuid::new_v4(),
        title: valid.title,
        genre: valid.genre,
        description: valid.description,
        image_url,
        created_at: OffsetDateTime::now_utc(),
    };
    if let Err(e) = store.insert_game(&game).await {
        discard_image(media, &game.image_url).await;
        return Err(e.into());
    }
    info!(game_id = %game.id, title = %game.title, "game created");

    Ok(GameView::new(game, GameStats::from(RatingTotals::default())))
}

pub async fn update_game(
    store: &dyn Store,
    media: &dyn MediaStorage,
    actor: &Actor,
    id: Uuid,
    input: GameInput,
    image: Option<Upload>,
) -> AppResult<GameView> {
    ensure(actor, can_manage_catalog(actor), ADMIN_REQUIRED)?;
    let valid = validate(&input)?;
    let mut game = store.find_game(id).await?.ok_or(AppError::NotFound("Game"))?;

    let replaced = match image {
        Some(upload) => {
            let url = store_image(media, "games", upload).await?;
            Some(std::mem::replace(&mut game.image_url, url))
        }
        None => None,
    };
    game.title = valid.title;
    game.genre = valid.genre;
    game.description = valid.description;

    if let Err(e) = store.update_game(&game).await {
        if replaced.is_some() {
            discard_image(media, &game.image_url).await;
        }
        return Err(e.into());
    }
    if let Some(old) = replaced {
        discard_image(media, &old).await;
    }
    info!(game_id = %game.id, "game updated");

    let stats = stats_for(store, id).await?;
    Ok(GameView::new(game, stats))
}

pub async fn delete_game(
    store: &dyn Store,
    media: &dyn MediaStorage,
    actor: &Actor,
    id: Uuid,
) -> AppResult<()> {
    ensure(actor, can_manage_catalog(actor), ADMIN_REQUIRED)?;
    let game = store.find_game(id).await?.ok_or(AppError::NotFound("Game"))?;
    if !store.delete_game_cascade(id).await? {
        return Err(AppError::NotFound("Game"));
    }
    discard_image(media, &game.image_url).await;
    info!(game_id = %id, "game deleted with its reviews and replies");
    Ok(())
}
