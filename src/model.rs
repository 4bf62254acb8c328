//! Core data model: tracked matches and the notification audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Monitored sport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Tennis,
    Basketball,
    Handball,
}

impl Sport {
    pub const ALL: [Sport; 3] = [Sport::Tennis, Sport::Basketball, Sport::Handball];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Tennis => "tennis",
            Sport::Basketball => "basketball",
            Sport::Handball => "handball",
        }
    }

    /// Provider-side sport id.
    pub fn provider_id(&self) -> u32 {
        match self {
            Sport::Tennis => 13,
            Sport::Basketball => 18,
            Sport::Handball => 78,
        }
    }

    /// Whether the match-winner market carries a draw outcome.
    pub fn has_draw(&self) -> bool {
        !matches!(self, Sport::Tennis)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tennis" => Ok(Sport::Tennis),
            "basketball" => Ok(Sport::Basketball),
            "handball" => Ok(Sport::Handball),
            other => Err(format!("unknown sport '{}'", other)),
        }
    }
}

/// Home or away side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    /// Lower decimal odds is the favorite; ties go to the away side.
    pub fn favorite(home_odds: f64, away_odds: f64) -> Side {
        if home_odds < away_odds {
            Side::Home
        } else {
            Side::Away
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// Match lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Halftime,
    Finished,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Halftime => "halftime",
            MatchStatus::Finished => "finished",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    /// Map the provider's `time_status` code onto a terminal status.
    pub fn from_provider_code(code: i64) -> Option<MatchStatus> {
        match code {
            3 | 6 | 9 | 11 => Some(MatchStatus::Finished),
            4 | 5 | 8 | 99 => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "halftime" => Ok(MatchStatus::Halftime),
            // Legacy rows used "completed".
            "finished" | "completed" => Ok(MatchStatus::Finished),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One tracked event, keyed by the provider's `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub event_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub league_name: String,
    pub start_time: DateTime<Utc>,

    pub pre_match_home_odds: f64,
    pub pre_match_away_odds: f64,
    pub pre_match_draw_odds: Option<f64>,
    pub pre_match_favorite: Side,

    pub status: MatchStatus,
    pub current_score_home: i32,
    pub current_score_away: i32,

    pub halftime_home_odds: Option<f64>,
    pub halftime_away_odds: Option<f64>,
    pub halftime_draw_odds: Option<f64>,

    pub favorite_trailing_at_halftime: bool,
    pub start_notification_sent: bool,
    pub halftime_notification_sent: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn favorite_team(&self) -> &str {
        match self.pre_match_favorite {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }

    pub fn favorite_pre_match_odds(&self) -> f64 {
        match self.pre_match_favorite {
            Side::Home => self.pre_match_home_odds,
            Side::Away => self.pre_match_away_odds,
        }
    }

    pub fn notification_sent(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::MatchStart => self.start_notification_sent,
            NotificationKind::HalftimeTrailing => self.halftime_notification_sent,
        }
    }

    /// Combine an incoming write with the row already stored under the same id.
    ///
    /// Sticky flags never go back to false, the first halftime snapshot wins, and
    /// pre-match facts only move while the stored row is still `scheduled`.
    /// Both store implementations apply exactly this rule.
    pub fn merged_onto(mut self, stored: &Match) -> Match {
        if stored.status != MatchStatus::Scheduled {
            self.pre_match_home_odds = stored.pre_match_home_odds;
            self.pre_match_away_odds = stored.pre_match_away_odds;
            self.pre_match_draw_odds = stored.pre_match_draw_odds;
            self.pre_match_favorite = stored.pre_match_favorite;
        }

        if stored.halftime_home_odds.is_some() || stored.halftime_away_odds.is_some() {
            self.halftime_home_odds = stored.halftime_home_odds;
            self.halftime_away_odds = stored.halftime_away_odds;
            self.halftime_draw_odds = stored.halftime_draw_odds;
        }

        self.favorite_trailing_at_halftime |= stored.favorite_trailing_at_halftime;
        self.start_notification_sent |= stored.start_notification_sent;
        self.halftime_notification_sent |= stored.halftime_notification_sent;
        self.created_at = stored.created_at;
        self
    }
}

/// Which one-time notification a match qualifies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MatchStart,
    HalftimeTrailing,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::MatchStart => "match_start",
            NotificationKind::HalftimeTrailing => "halftime_trailing",
        }
    }

    pub fn channel(&self) -> ChannelType {
        match self {
            NotificationKind::MatchStart => ChannelType::Free,
            NotificationKind::HalftimeTrailing => ChannelType::Premium,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Free,
    Premium,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Free => "free",
            ChannelType::Premium => "premium",
        }
    }
}

/// Append-only audit record of one dispatch attempt.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationLog {
    pub id: Uuid,
    pub event_id: String,
    pub channel_type: ChannelType,
    pub notification_type: NotificationKind,
    pub content: String,
    pub sent_count: u32,
    pub failed_count: u32,
    pub success: bool,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}
