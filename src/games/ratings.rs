//! Per-game rating aggregates. Computed on every read from the reviews that
//! exist at that moment; nothing is cached on the game record.

use uuid::Uuid;

use crate::store::{Game, RatingTotals, Store, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameStats {
    pub avg_rating: f64,
    pub review_count: i64,
}

impl From<RatingTotals> for GameStats {
    fn from(t: RatingTotals) -> Self {
        Self {
            avg_rating: average(t),
            review_count: t.count,
        }
    }
}

/// Mean rating rounded half-up to one decimal, computed in integer tenths;
/// 0 with no reviews.
pub fn average(t: RatingTotals) -> f64 {
    if t.count <= 0 {
        return 0.0;
    }
    let tenths = (20 * t.sum + t.count) / (2 * t.count);
    tenths as f64 / 10.0
}

/// Attaches stats to every game with one batch query.
pub async fn with_stats(store: &dyn Store, games: Vec<Game>) -> StoreResult<Vec<(Game, GameStats)>> {
    let ids: Vec<Uuid> = games.iter().map(|g| g.id).collect();
    let totals = store.rating_totals(&ids).await?;
    Ok(games
        .into_iter()
        .map(|g| {
            let stats: GameStats = totals.get(&g.id).copied().unwrap_or_default().into();
            (g, stats)
        })
        .collect())
}

pub async fn stats_for(store: &dyn Store, game_id: Uuid) -> StoreResult<GameStats> {
    let totals = store.rating_totals(&[game_id]).await?;
    Ok(totals.get(&game_id).copied().unwrap_or_default().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avg(ratings: &[i64]) -> f64 {
        average(RatingTotals {
            sum: ratings.iter().sum(),
            count: ratings.len() as i64,
        })
    }

    #[test]
    fn no_reviews_is_zero() {
        assert_eq!(avg(&[]), 0.0);
        assert_eq!(GameStats::from(RatingTotals::default()).review_count, 0);
    }

    #[test]
    fn single_review_is_its_rating() {
        assert_eq!(avg(&[4]), 4.0);
        assert_eq!(avg(&[1]), 1.0);
    }

    #[test]
    fn rounds_to_one_decimal() {
        assert_eq!(avg(&[4, 5]), 4.5);
        assert_eq!(avg(&[5, 4, 4]), 4.3); // 4.333..
        assert_eq!(avg(&[5, 5, 4]), 4.7); // 4.666..
        assert_eq!(avg(&[1, 2, 2, 2, 2, 2, 2, 2]), 1.9); // 1.875
        assert_eq!(avg(&[1, 1, 1, 2]), 1.3); // 1.25 rounds up
    }

    #[test]
    fn matches_arithmetic_mean_for_many_mixes() {
        let mixes: &[&[i64]] = &[&[1, 2, 3, 4, 5], &[5; 7], &[2, 3], &[1, 5, 5, 5, 1, 3]];
        for ratings in mixes {
            let mean = ratings.iter().sum::<i64>() as f64 / ratings.len() as f64;
            assert!((avg(ratings) - mean).abs() <= 0.05 + f64::EPSILON, "{ratings:?}");
        }
    }
}
