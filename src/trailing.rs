//! "Favorite currently behind" detection.

use crate::model::Side;
use crate::score::{parse_score, Score};
use serde_json::Value;

/// True when the pre-match favorite is strictly behind. Level scores are not trailing.
pub fn is_favorite_trailing(favorite: Side, score: Score) -> bool {
    match favorite {
        Side::Home => score.home < score.away,
        Side::Away => score.away < score.home,
    }
}

/// Same check on a raw score. Unparseable scores read as `0-0`, which is never trailing.
pub fn is_favorite_trailing_raw(favorite: Side, raw_score: Option<&Value>) -> bool {
    is_favorite_trailing(favorite, parse_score(raw_score))
}
