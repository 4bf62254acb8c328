//! Score normalization.
//!
//! Scores show up as `{"home": 1, "away": 0}`, `"1-0"`, `"2:1"`, `"1 0"` or
//! not at all. Anything that is not unambiguously two integers is `0-0`.

use crate::payload::coerce_int;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Score {
    pub home: i32,
    pub away: i32,
}

impl Score {
    pub const ZERO: Score = Score { home: 0, away: 0 };

    pub fn new(home: i32, away: i32) -> Self {
        Self { home, away }
    }

    pub fn total(&self) -> i64 {
        i64::from(self.home) + i64::from(self.away)
    }
}

/// Parse a score of unknown shape. Never fails; unparseable input is `0-0`.
pub fn parse_score(value: Option<&Value>) -> Score {
    value.and_then(try_parse).unwrap_or(Score::ZERO)
}

fn try_parse(value: &Value) -> Option<Score> {
    match value {
        Value::Object(map) => {
            let home = side(map.get("home"))?;
            let away = side(map.get("away"))?;
            Some(Score::new(home, away))
        }
        Value::Array(items) if items.len() == 2 => {
            let home = to_i32(&items[0])?;
            let away = to_i32(&items[1])?;
            Some(Score::new(home, away))
        }
        Value::String(s) => parse_delimited(s),
        _ => None,
    }
}

// A missing or null side in a structured score counts as zero.
fn side(value: Option<&Value>) -> Option<i32> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(v) => to_i32(v),
    }
}

fn to_i32(value: &Value) -> Option<i32> {
    coerce_int(value).and_then(|n| i32::try_from(n).ok())
}

fn parse_delimited(s: &str) -> Option<Score> {
    let (home, away) = if let Some(pair) = s.split_once('-') {
        pair
    } else if let Some(pair) = s.split_once(':') {
        pair
    } else {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(home), Some(away), None) => (home, away),
            _ => return None,
        }
    };

    let home = home.trim().parse().ok()?;
    let away = away.trim().parse().ok()?;
    Some(Score::new(home, away))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Score {
        parse_score(Some(&v))
    }

    #[test]
    fn delimited_strings() {
        assert_eq!(parse(json!("1-0")), Score::new(1, 0));
        assert_eq!(parse(json!("2:1")), Score::new(2, 1));
        assert_eq!(parse(json!("1 0")), Score::new(1, 0));
        assert_eq!(parse(json!(" 3 - 4 ")), Score::new(3, 4));
    }

    #[test]
    fn structured_pairs() {
        assert_eq!(parse(json!({"home": 2, "away": "5"})), Score::new(2, 5));
        assert_eq!(parse(json!({"home": null, "away": 1})), Score::new(0, 1));
        assert_eq!(parse(json!([1, 3])), Score::new(1, 3));
    }

    #[test]
    fn anything_else_is_zero() {
        assert_eq!(parse(json!("garbage")), Score::ZERO);
        assert_eq!(parse_score(None), Score::ZERO);
        assert_eq!(parse(json!(null)), Score::ZERO);
        assert_eq!(parse(json!([])), Score::ZERO);
        assert_eq!(parse(json!("1 2 3")), Score::ZERO);
        assert_eq!(parse(json!("6-4,3-2")), Score::ZERO);
        assert_eq!(parse(json!({"home": "x", "away": 1})), Score::ZERO);
    }
}
