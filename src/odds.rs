//! Match-winner odds extraction from arbitrarily shaped odds documents.
//!
//! Resolution order, first complete result wins:
//! 1. a flat list of priced outcomes (position 0/1/2 = home/away/draw)
//! 2. sport-specific known market paths, matching outcomes by header/name token
//! 3. a depth-bounded scan for any `odds` keys, in document order

use crate::model::Sport;
use crate::payload::{coerce_odds, get_path};
use serde::Serialize;
use serde_json::Value;

/// Deepest nesting level the fallback scan descends to.
pub const MAX_SCAN_DEPTH: usize = 4;

/// Decimal odds for the match-winner market.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OddsTriple {
    pub home: Option<f64>,
    pub away: Option<f64>,
    pub draw: Option<f64>,
}

impl OddsTriple {
    /// Both sides resolved; the draw is optional even for three-way sports.
    pub fn is_complete(&self) -> bool {
        self.home.is_some() && self.away.is_some()
    }

    pub fn pair(&self) -> Option<(f64, f64)> {
        Some((self.home?, self.away?))
    }

    fn for_sport(mut self, sport: Sport) -> Self {
        if !sport.has_draw() {
            self.draw = None;
        }
        self
    }
}

fn known_paths(sport: Sport) -> &'static [&'static str] {
    match sport {
        Sport::Tennis => &["main.sp.to_win_match.odds"],
        Sport::Basketball => &[
            "main.sp.game_lines.odds",
            "main.sp.money_line.odds",
            "main.sp.to_win_match.odds",
            "main.sp.match_result.odds",
        ],
        Sport::Handball => &[
            "main.sp.full_time_result.odds",
            "main.sp.match_result.odds",
            "main.sp.3_way_result.odds",
            "main.sp.game_lines.odds",
        ],
    }
}

/// Extract (home, away, draw) decimal odds. Never fails; unresolved sides are `None`.
pub fn extract_odds(payload: &Value, sport: Sport) -> OddsTriple {
    if let Value::Array(items) = payload {
        if is_outcome_list(items) {
            return by_position(items, sport);
        }
    }

    // Provider `results` arrays wrap the odds document in a single-element list.
    let doc = match payload {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };

    for path in known_paths(sport) {
        if let Some(Value::Array(outcomes)) = get_path(doc, path) {
            let triple = from_market(outcomes, sport);
            if triple.is_complete() {
                return triple;
            }
        }
    }

    let want = if sport.has_draw() { 3 } else { 2 };
    let mut found = Vec::with_capacity(want);
    scan(doc, 0, want, &mut found);
    OddsTriple {
        home: found.first().copied(),
        away: found.get(1).copied(),
        draw: found.get(2).copied(),
    }
    .for_sport(sport)
}

fn is_outcome_list(items: &[Value]) -> bool {
    !items.is_empty()
        && items.iter().all(|item| match item {
            Value::Number(_) | Value::String(_) => true,
            Value::Object(map) => map.get("odds").map_or(false, is_scalar),
            _ => false,
        })
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_))
}

fn outcome_price(item: &Value) -> Option<f64> {
    match item {
        Value::Object(map) => map.get("odds").and_then(coerce_odds),
        other => coerce_odds(other),
    }
}

fn by_position(items: &[Value], sport: Sport) -> OddsTriple {
    OddsTriple {
        home: items.first().and_then(outcome_price),
        away: items.get(1).and_then(outcome_price),
        draw: items.get(2).and_then(outcome_price),
    }
    .for_sport(sport)
}

#[derive(Clone, Copy, PartialEq)]
enum Slot {
    Home,
    Away,
    Draw,
}

fn slot_for_token(token: &str) -> Option<Slot> {
    match token.trim().to_lowercase().as_str() {
        "1" | "home" => Some(Slot::Home),
        "2" | "away" => Some(Slot::Away),
        "x" | "draw" | "tie" => Some(Slot::Draw),
        _ => None,
    }
}

fn field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}

fn is_winner_line(item: &Value) -> bool {
    field(item, "name").map_or(false, |name| {
        let name = name.to_lowercase();
        name.contains("money line") || name.contains("to win") || name == "winner"
    })
}

/// Resolve a market's outcome list: explicit header/name tokens first, then list position.
fn from_market(outcomes: &[Value], sport: Sport) -> OddsTriple {
    // Game-lines markets mix spread and total rows in with the money line.
    let winner_rows: Vec<&Value> = outcomes.iter().filter(|o| is_winner_line(o)).collect();
    let rows: Vec<&Value> = if winner_rows.is_empty() {
        outcomes.iter().collect()
    } else {
        winner_rows
    };

    let mut triple = OddsTriple::default();
    let mut unclaimed: Vec<&Value> = Vec::with_capacity(rows.len());
    for row in &rows {
        let slot = field(row, "header")
            .and_then(slot_for_token)
            .or_else(|| field(row, "name").and_then(slot_for_token));
        let target = match slot {
            Some(Slot::Home) => &mut triple.home,
            Some(Slot::Away) => &mut triple.away,
            Some(Slot::Draw) => &mut triple.draw,
            None => {
                unclaimed.push(row);
                continue;
            }
        };
        if target.is_none() {
            *target = outcome_price(row);
        }
    }

    // Untokened rows fill the remaining slots in list order; a tokened row is never reused.
    let mut leftovers = unclaimed.into_iter();
    let mut missing: Vec<&mut Option<f64>> = Vec::with_capacity(3);
    if triple.home.is_none() {
        missing.push(&mut triple.home);
    }
    if triple.away.is_none() {
        missing.push(&mut triple.away);
    }
    if triple.draw.is_none() && sport.has_draw() {
        missing.push(&mut triple.draw);
    }
    for slot in missing {
        match leftovers.next() {
            Some(row) => *slot = outcome_price(row),
            None => break,
        }
    }
    triple.for_sport(sport)
}

// Depth counts object levels below the root; arrays are transparent.
fn scan(value: &Value, depth: usize, want: usize, found: &mut Vec<f64>) {
    if depth > MAX_SCAN_DEPTH || found.len() >= want {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "odds" {
                    collect_prices(child, depth, want, found);
                } else {
                    scan(child, depth + 1, want, found);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                scan(item, depth, want, found);
            }
        }
        _ => {}
    }
}

fn collect_prices(value: &Value, depth: usize, want: usize, found: &mut Vec<f64>) {
    match value {
        Value::Array(items) => {
            for item in items {
                if found.len() >= want {
                    return;
                }
                match item {
                    Value::Object(map) if map.get("odds").map_or(false, is_scalar) => {
                        found.extend(outcome_price(item));
                    }
                    Value::Number(_) | Value::String(_) => found.extend(coerce_odds(item)),
                    _ => scan(item, depth + 1, want, found),
                }
            }
        }
        Value::Object(_) => scan(value, depth + 1, want, found),
        scalar => {
            if found.len() < want {
                found.extend(coerce_odds(scalar));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_outcome_list_by_position() {
        let payload = json!([{"odds": "1.50"}, {"odds": "2.60"}]);
        let odds = extract_odds(&payload, Sport::Tennis);
        assert_eq!(odds.pair(), Some((1.5, 2.6)));
        assert_eq!(odds.draw, None);
    }

    #[test]
    fn flat_list_draw_only_for_three_way_sports() {
        let payload = json!([{"odds": 1.9}, {"odds": 2.1}, {"odds": 15.0}]);
        assert_eq!(extract_odds(&payload, Sport::Handball).draw, Some(15.0));
        assert_eq!(extract_odds(&payload, Sport::Tennis).draw, None);
    }

    #[test]
    fn bad_value_in_flat_list_is_absent_not_shifted() {
        let payload = json!([{"odds": "SP"}, {"odds": "2.60"}, {"odds": "3.1"}]);
        let odds = extract_odds(&payload, Sport::Basketball);
        assert_eq!(odds.home, None);
        assert_eq!(odds.away, Some(2.6));
        assert!(!odds.is_complete());
    }

    #[test]
    fn tennis_known_path() {
        let payload = json!([{
            "FI": "123",
            "main": {"sp": {"to_win_match": {"odds": [
                {"header": "1", "odds": "1.80"},
                {"header": "2", "odds": "2.00"}
            ]}}}
        }]);
        let odds = extract_odds(&payload, Sport::Tennis);
        assert_eq!(odds.pair(), Some((1.8, 2.0)));
    }

    #[test]
    fn basketball_game_lines_pick_money_line_by_header() {
        let payload = json!({
            "main": {"sp": {"game_lines": {"odds": [
                {"header": "1", "name": "Spread", "handicap": "-3.5", "odds": "1.91"},
                {"header": "1", "name": "Total", "handicap": "O 160.5", "odds": "1.87"},
                {"header": "1", "name": "Money Line", "odds": "1.40"},
                {"header": "2", "name": "Spread", "handicap": "+3.5", "odds": "1.91"},
                {"header": "2", "name": "Total", "handicap": "U 160.5", "odds": "1.95"},
                {"header": "2", "name": "Money Line", "odds": "3.00"}
            ]}}}
        });
        let odds = extract_odds(&payload, Sport::Basketball);
        assert_eq!(odds.pair(), Some((1.4, 3.0)));
        assert_eq!(odds.draw, None);
    }

    #[test]
    fn handball_tokens_in_any_order() {
        let payload = json!({
            "main": {"sp": {"full_time_result": {"odds": [
                {"name": "2", "odds": "4.50"},
                {"name": "X", "odds": "9.00"},
                {"name": "1", "odds": "1.25"}
            ]}}}
        });
        let odds = extract_odds(&payload, Sport::Handball);
        assert_eq!(odds.home, Some(1.25));
        assert_eq!(odds.away, Some(4.5));
        assert_eq!(odds.draw, Some(9.0));
    }

    #[test]
    fn partially_tokened_handball_market_never_reuses_a_row() {
        let payload = json!({
            "main": {"sp": {"full_time_result": {"odds": [
                {"header": "X", "odds": "9.00"},
                {"odds": "1.30"},
                {"odds": "4.00"}
            ]}}}
        });
        let odds = extract_odds(&payload, Sport::Handball);
        assert_eq!(odds.draw, Some(9.0));
        assert_eq!(odds.home, Some(1.3));
        assert_eq!(odds.away, Some(4.0));
    }

    #[test]
    fn partially_tokened_tennis_market_fills_home_from_untokened_row() {
        let payload = json!({
            "main": {"sp": {"to_win_match": {"odds": [
                {"header": "2", "odds": "3.00"},
                {"name": "Player A", "odds": "1.40"}
            ]}}}
        });
        let odds = extract_odds(&payload, Sport::Tennis);
        assert_eq!(odds.away, Some(3.0));
        assert_eq!(odds.home, Some(1.4));
        assert_ne!(odds.home, odds.away);
    }

    #[test]
    fn recursive_scan_in_document_order() {
        let payload = json!({
            "others": [{"sp": {"winner": {"odds": [{"odds": "1.70"}, {"odds": "2.10"}]}}}]
        });
        let odds = extract_odds(&payload, Sport::Tennis);
        assert_eq!(odds.pair(), Some((1.7, 2.1)));
    }

    #[test]
    fn recursive_scan_is_depth_bounded() {
        let within = json!({"a": {"b": {"c": {"d": {"odds": 1.5}}}}, "x": {"odds": 2.5}});
        assert_eq!(extract_odds(&within, Sport::Tennis).pair(), Some((1.5, 2.5)));

        let too_deep = json!({"a": {"b": {"c": {"d": {"e": {"odds": 1.5}}}}}, "x": {"odds": 2.5}});
        let odds = extract_odds(&too_deep, Sport::Tennis);
        assert_eq!(odds.home, Some(2.5));
        assert_eq!(odds.away, None);
    }

    #[test]
    fn nothing_usable() {
        assert!(!extract_odds(&json!(null), Sport::Tennis).is_complete());
        assert!(!extract_odds(&json!({"main": {}}), Sport::Handball).is_complete());
        assert!(!extract_odds(&json!([]), Sport::Basketball).is_complete());
    }
}
