//! Coarse match-phase classification from elapsed-time fields.
//!
//! Minute thresholds are heuristics for typical match durations, not a provider
//! contract, so they live in [`PhaseThresholds`] and come from configuration.

use crate::model::Sport;
use crate::payload::coerce_int;
use crate::score::Score;
use serde::Serialize;
use serde_json::Value;

/// Inclusive minute range treated as the halfway break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteWindow {
    pub from: u32,
    pub to: u32,
}

impl MinuteWindow {
    pub const fn new(from: u32, to: u32) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, minute: u32) -> bool {
        minute >= self.from && minute <= self.to
    }

    /// Parse `"22-26"`. Returns `None` for reversed or malformed ranges.
    pub fn parse(s: &str) -> Option<Self> {
        let (from, to) = s.split_once('-')?;
        let from = from.trim().parse().ok()?;
        let to = to.trim().parse().ok()?;
        (from <= to).then_some(Self { from, to })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseThresholds {
    pub basketball_halftime: MinuteWindow,
    pub basketball_fourth_quarter_from: u32,
    pub handball_halftime: MinuteWindow,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            basketball_halftime: MinuteWindow::new(22, 26),
            basketball_fourth_quarter_from: 46,
            handball_halftime: MinuteWindow::new(28, 32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    FirstHalf,
    Halftime,
    SecondHalf,
    ThirdQuarter,
    FourthQuarter,
    FirstSet,
    FirstSetComplete,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::FirstHalf => "first_half",
            MatchPhase::Halftime => "halftime",
            MatchPhase::SecondHalf => "second_half",
            MatchPhase::ThirdQuarter => "third_quarter",
            MatchPhase::FourthQuarter => "fourth_quarter",
            MatchPhase::FirstSet => "first_set",
            MatchPhase::FirstSetComplete => "first_set_complete",
        }
    }
}

/// Elapsed-time fields of an in-play event (`TM`, `TS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElapsedTime {
    pub minutes: u32,
    pub seconds: u32,
}

impl ElapsedTime {
    /// Read the `timer` (or object-shaped `time`) block. Anything unparseable is minute 0.
    pub fn from_event(raw: &Value) -> Self {
        let block = match (raw.get("timer"), raw.get("time")) {
            (Some(t @ Value::Object(_)), _) => t,
            (_, Some(t @ Value::Object(_))) => t,
            _ => return Self::default(),
        };

        let read = |lower: &str, upper: &str| block.get(lower).or_else(|| block.get(upper));
        let count = |v: Option<&Value>| {
            v.and_then(coerce_int)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };

        Self {
            minutes: count(read("tm", "TM")),
            seconds: count(read("ts", "TS")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseReading {
    pub phase: MatchPhase,
    pub is_halftime: bool,
}

/// Classify the phase. Tennis ignores the clock and uses the set score instead:
/// any completed set counts as the halfway signal.
pub fn classify(
    sport: Sport,
    elapsed: ElapsedTime,
    set_score: Score,
    thresholds: &PhaseThresholds,
) -> PhaseReading {
    let minute = elapsed.minutes;
    let phase = match sport {
        Sport::Tennis => {
            if set_score.total() >= 1 {
                MatchPhase::FirstSetComplete
            } else {
                MatchPhase::FirstSet
            }
        }
        Sport::Basketball => {
            let window = thresholds.basketball_halftime;
            if minute < window.from {
                MatchPhase::FirstHalf
            } else if window.contains(minute) {
                MatchPhase::Halftime
            } else if minute < thresholds.basketball_fourth_quarter_from {
                MatchPhase::ThirdQuarter
            } else {
                MatchPhase::FourthQuarter
            }
        }
        Sport::Handball => {
            let window = thresholds.handball_halftime;
            if minute < window.from {
                MatchPhase::FirstHalf
            } else if window.contains(minute) {
                MatchPhase::Halftime
            } else {
                MatchPhase::SecondHalf
            }
        }
    };

    PhaseReading {
        phase,
        is_halftime: matches!(phase, MatchPhase::Halftime | MatchPhase::FirstSetComplete),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(sport: Sport, minutes: u32) -> PhaseReading {
        let elapsed = ElapsedTime {
            minutes,
            seconds: 0,
        };
        classify(sport, elapsed, Score::ZERO, &PhaseThresholds::default())
    }

    #[test]
    fn basketball_phases() {
        assert_eq!(at(Sport::Basketball, 10).phase, MatchPhase::FirstHalf);
        assert!(!at(Sport::Basketball, 10).is_halftime);
        assert_eq!(at(Sport::Basketball, 22).phase, MatchPhase::Halftime);
        assert!(at(Sport::Basketball, 24).is_halftime);
        assert_eq!(at(Sport::Basketball, 26).phase, MatchPhase::Halftime);
        assert_eq!(at(Sport::Basketball, 30).phase, MatchPhase::ThirdQuarter);
        assert_eq!(at(Sport::Basketball, 46).phase, MatchPhase::FourthQuarter);
        assert_eq!(at(Sport::Basketball, 50).phase, MatchPhase::FourthQuarter);
    }

    #[test]
    fn handball_phases() {
        assert_eq!(at(Sport::Handball, 10).phase, MatchPhase::FirstHalf);
        assert!(at(Sport::Handball, 30).is_halftime);
        assert_eq!(at(Sport::Handball, 33).phase, MatchPhase::SecondHalf);
    }

    #[test]
    fn tennis_uses_completed_sets() {
        let thresholds = PhaseThresholds::default();
        let elapsed = ElapsedTime::default();
        let before = classify(Sport::Tennis, elapsed, Score::ZERO, &thresholds);
        assert_eq!(before.phase, MatchPhase::FirstSet);
        assert!(!before.is_halftime);

        let after = classify(Sport::Tennis, elapsed, Score::new(0, 1), &thresholds);
        assert_eq!(after.phase, MatchPhase::FirstSetComplete);
        assert!(after.is_halftime);
    }

    #[test]
    fn elapsed_time_from_timer_or_time_block() {
        let timer = ElapsedTime::from_event(&json!({"timer": {"tm": 24, "ts": "13", "tt": "1"}}));
        assert_eq!(
            timer,
            ElapsedTime {
                minutes: 24,
                seconds: 13
            }
        );

        let time = ElapsedTime::from_event(&json!({"time": {"TM": "31", "TT": false}}));
        assert_eq!(time.minutes, 31);
    }

    #[test]
    fn unparseable_time_is_minute_zero() {
        assert_eq!(ElapsedTime::from_event(&json!({"time": "1700000000"})).minutes, 0);
        assert_eq!(ElapsedTime::from_event(&json!({"timer": {"tm": "??"}})).minutes, 0);
        assert_eq!(ElapsedTime::from_event(&json!({"timer": {"tm": -5}})).minutes, 0);
        assert_eq!(at(Sport::Basketball, 0).phase, MatchPhase::FirstHalf);
    }

    #[test]
    fn window_parsing() {
        assert_eq!(MinuteWindow::parse("22-26"), Some(MinuteWindow::new(22, 26)));
        assert_eq!(MinuteWindow::parse(" 28 - 32 "), Some(MinuteWindow::new(28, 32)));
        assert_eq!(MinuteWindow::parse("30-20"), None);
        assert_eq!(MinuteWindow::parse("abc"), None);
    }
}
