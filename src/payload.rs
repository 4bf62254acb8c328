//! Type guards over loosely-typed provider payloads.
//!
//! The provider hands back `serde_json::Value` trees whose shape drifts between
//! endpoints and sports. Every accessor here checks the variant it expects and
//! returns `None` instead of failing, so callers decide what "absent" means.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Sentinel used when no usable price exists. Anything at or above it is a placeholder.
pub const PLACEHOLDER_ODDS: f64 = 999.0;

/// Coerce a candidate odds value into decimal odds.
///
/// Accepts numbers, numeric strings and fractional strings (`"5/2"` -> 3.5).
pub fn coerce_odds(value: &Value) -> Option<f64> {
    let odds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_odds_str(s)?,
        _ => return None,
    };

    if odds.is_finite() && odds >= 1.0 && odds < PLACEHOLDER_ODDS {
        Some(odds)
    } else {
        None
    }
}

fn parse_odds_str(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den + 1.0);
    }
    s.parse().ok()
}

/// Coerce an integer-like value (integral number or numeric string).
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Provider event id, which arrives as either a string or an integer.
pub fn event_id(raw: &Value) -> Option<String> {
    match raw.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Walk a dotted path through nested objects. Numeric segments index into arrays.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Display name stored under `raw[key].name` (or `raw[key]` directly when it is a string).
pub fn display_name(raw: &Value, key: &str, fallback: &str) -> String {
    let name = match raw.get(key) {
        Some(Value::Object(map)) => map.get("name").and_then(Value::as_str),
        Some(Value::String(s)) => Some(s.as_str()),
        _ => None,
    };

    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => fallback.to_string(),
    }
}

/// Kick-off time as unix seconds or RFC 3339.
pub fn parse_start_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(secs) => secs,
                Err(_) => {
                    return DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                }
            }
        }
        _ => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

/// Provider lifecycle code (`time_status`), when present.
pub fn time_status(raw: &Value) -> Option<i64> {
    raw.get("time_status").and_then(coerce_int)
}
