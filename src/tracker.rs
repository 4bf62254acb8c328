//! Applies raw upcoming / in-play events to the match table.
//!
//! Upcoming events create `scheduled` rows and keep refreshing them until the
//! match leaves `scheduled`; from then on pre-match odds and favorite are frozen.
//! In-play events update score and status, and on the transition into the
//! halfway condition evaluate the trailing check once, snapshotting live odds
//! when it fires. An in-play event with no row yet is synthesized from live data.

use crate::error::{IngestError, PayloadError};
use crate::model::{Match, MatchStatus, Side, Sport};
use crate::odds::{extract_odds, OddsTriple};
use crate::payload::{display_name, event_id, parse_start_time, time_status};
use crate::phase::{classify, ElapsedTime, PhaseReading, PhaseThresholds};
use crate::score::{parse_score, Score};
use crate::store::MatchStore;
use crate::trailing::is_favorite_trailing;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Assumed elapsed time for matches first seen while already in play.
const SYNTHESIZED_START_OFFSET_MINUTES: i64 = 30;

const UNKNOWN_HOME: &str = "Unknown Home";
const UNKNOWN_AWAY: &str = "Unknown Away";
const UNKNOWN_LEAGUE: &str = "Unknown League";

/// Take the observed name unless the payload only gave us the placeholder.
fn refresh_name(stored: &mut String, observed: &str, placeholder: &str) {
    if observed != placeholder && stored.as_str() != observed {
        *stored = observed.to_string();
    }
}

/// Normalized view of one upcoming event.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingObservation {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub league_name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub odds: OddsTriple,
    pub terminal: Option<MatchStatus>,
}

impl UpcomingObservation {
    pub fn parse(sport: Sport, raw: &Value) -> Result<Self, PayloadError> {
        let event_id = event_id(raw).ok_or(PayloadError::MissingEventId)?;

        Ok(Self {
            home_team: display_name(raw, "home", UNKNOWN_HOME),
            away_team: display_name(raw, "away", UNKNOWN_AWAY),
            league_name: display_name(raw, "league", UNKNOWN_LEAGUE),
            start_time: parse_start_time(raw.get("time")),
            odds: extract_odds(raw.get("odds").unwrap_or(&Value::Null), sport),
            terminal: time_status(raw).and_then(MatchStatus::from_provider_code),
            event_id,
        })
    }
}

/// Normalized view of one in-play event.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveObservation {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub league_name: String,
    pub score: Score,
    pub phase: PhaseReading,
    pub odds: OddsTriple,
    pub terminal: Option<MatchStatus>,
}

impl LiveObservation {
    pub fn parse(sport: Sport, raw: &Value, thresholds: &PhaseThresholds) -> Result<Self, PayloadError> {
        let event_id = event_id(raw).ok_or(PayloadError::MissingEventId)?;

        let score = parse_score(raw.get("ss"));
        let phase = classify(sport, ElapsedTime::from_event(raw), score, thresholds);

        Ok(Self {
            home_team: display_name(raw, "home", UNKNOWN_HOME),
            away_team: display_name(raw, "away", UNKNOWN_AWAY),
            league_name: display_name(raw, "league", UNKNOWN_LEAGUE),
            score,
            phase,
            odds: extract_odds(raw.get("odds").unwrap_or(&Value::Null), sport),
            terminal: time_status(raw).and_then(MatchStatus::from_provider_code),
            event_id,
        })
    }

    pub fn status(&self) -> MatchStatus {
        match self.terminal {
            Some(status) => status,
            None if self.phase.is_halftime => MatchStatus::Halftime,
            None => MatchStatus::Live,
        }
    }
}

/// What happened to one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// New scheduled row.
    Created,
    /// Existing scheduled row refreshed from upcoming data.
    Refreshed,
    /// Upcoming data for a match already past `scheduled`; nothing written.
    Frozen,
    /// Existing row updated from in-play data.
    Updated,
    /// New row synthesized from in-play data.
    CreatedFromLive,
    /// No valid price (or already over); the event is not tracked.
    NotTracked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub observed: usize,
    pub created: usize,
    pub refreshed: usize,
    pub updated: usize,
    pub created_from_live: usize,
    pub not_tracked: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, applied: Applied) {
        match applied {
            Applied::Created => self.created += 1,
            Applied::Refreshed => self.refreshed += 1,
            Applied::Frozen => {}
            Applied::Updated => self.updated += 1,
            Applied::CreatedFromLive => self.created_from_live += 1,
            Applied::NotTracked => self.not_tracked += 1,
        }
    }

    pub fn absorb(&mut self, other: BatchSummary) {
        self.observed += other.observed;
        self.created += other.created;
        self.refreshed += other.refreshed;
        self.updated += other.updated;
        self.created_from_live += other.created_from_live;
        self.not_tracked += other.not_tracked;
        self.failed += other.failed;
    }
}

#[derive(Clone)]
pub struct MatchTracker {
    store: Arc<dyn MatchStore>,
    thresholds: PhaseThresholds,
}

impl MatchTracker {
    pub fn new(store: Arc<dyn MatchStore>, thresholds: PhaseThresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    /// Apply one cycle's fetch results for a sport: upcoming first, then in-play.
    /// Each item is its own unit; a failure is logged and skipped.
    pub async fn ingest_batch(
        &self,
        sport: Sport,
        upcoming: &[Value],
        in_play: &[Value],
        now: DateTime<Utc>,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for raw in upcoming {
            summary.observed += 1;
            match self.ingest_upcoming(sport, raw, now).await {
                Ok(applied) => summary.record(applied),
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        "Skipping upcoming {} event {}: {}",
                        sport,
                        event_id(raw).unwrap_or_else(|| "?".to_string()),
                        e
                    );
                }
            }
        }

        for raw in in_play {
            summary.observed += 1;
            match self.ingest_in_play(sport, raw, now).await {
                Ok(applied) => summary.record(applied),
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        "Skipping in-play {} event {}: {}",
                        sport,
                        event_id(raw).unwrap_or_else(|| "?".to_string()),
                        e
                    );
                    debug!("Payload that caused error: {}", raw);
                }
            }
        }

        summary
    }

    pub async fn ingest_upcoming(
        &self,
        sport: Sport,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<Applied, IngestError> {
        let obs = UpcomingObservation::parse(sport, raw)?;

        match self.store.get(&obs.event_id).await? {
            None => {
                if obs.terminal.is_some() {
                    return Ok(Applied::NotTracked);
                }
                let Some((home_odds, away_odds)) = obs.odds.pair() else {
                    debug!("Not tracking {} - missing essential odds", obs.event_id);
                    return Ok(Applied::NotTracked);
                };

                let record = Match {
                    event_id: obs.event_id,
                    sport,
                    home_team: obs.home_team,
                    away_team: obs.away_team,
                    league_name: obs.league_name,
                    start_time: obs.start_time.unwrap_or(now),
                    pre_match_home_odds: home_odds,
                    pre_match_away_odds: away_odds,
                    pre_match_draw_odds: obs.odds.draw,
                    pre_match_favorite: Side::favorite(home_odds, away_odds),
                    status: MatchStatus::Scheduled,
                    current_score_home: 0,
                    current_score_away: 0,
                    halftime_home_odds: None,
                    halftime_away_odds: None,
                    halftime_draw_odds: None,
                    favorite_trailing_at_halftime: false,
                    start_notification_sent: false,
                    halftime_notification_sent: false,
                    created_at: now,
                    updated_at: now,
                };
                self.store.upsert(&record).await?;
                info!(
                    "Added new {} match: {} vs {} (favorite: {})",
                    sport,
                    record.home_team,
                    record.away_team,
                    record.pre_match_favorite.as_str()
                );
                Ok(Applied::Created)
            }
            Some(mut record) if record.status == MatchStatus::Scheduled => {
                refresh_name(&mut record.home_team, &obs.home_team, UNKNOWN_HOME);
                refresh_name(&mut record.away_team, &obs.away_team, UNKNOWN_AWAY);
                refresh_name(&mut record.league_name, &obs.league_name, UNKNOWN_LEAGUE);
                if let Some(start_time) = obs.start_time {
                    record.start_time = start_time;
                }
                if let Some((home_odds, away_odds)) = obs.odds.pair() {
                    record.pre_match_home_odds = home_odds;
                    record.pre_match_away_odds = away_odds;
                    record.pre_match_draw_odds = obs.odds.draw;
                    record.pre_match_favorite = Side::favorite(home_odds, away_odds);
                }
                if let Some(terminal) = obs.terminal {
                    record.status = terminal;
                }
                record.updated_at = now;
                self.store.upsert(&record).await?;
                Ok(Applied::Refreshed)
            }
            Some(_) => Ok(Applied::Frozen),
        }
    }

    pub async fn ingest_in_play(
        &self,
        sport: Sport,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<Applied, IngestError> {
        let obs = LiveObservation::parse(sport, raw, &self.thresholds)?;

        match self.store.get(&obs.event_id).await? {
            Some(mut record) => {
                let entering_halftime =
                    obs.status() == MatchStatus::Halftime && record.status != MatchStatus::Halftime;

                refresh_name(&mut record.home_team, &obs.home_team, UNKNOWN_HOME);
                refresh_name(&mut record.away_team, &obs.away_team, UNKNOWN_AWAY);
                refresh_name(&mut record.league_name, &obs.league_name, UNKNOWN_LEAGUE);
                record.current_score_home = obs.score.home;
                record.current_score_away = obs.score.away;
                record.status = obs.status();

                if entering_halftime
                    && !record.favorite_trailing_at_halftime
                    && is_favorite_trailing(record.pre_match_favorite, obs.score)
                {
                    record.favorite_trailing_at_halftime = true;
                    if record.halftime_home_odds.is_none() && record.halftime_away_odds.is_none() {
                        record.halftime_home_odds = obs.odds.home;
                        record.halftime_away_odds = obs.odds.away;
                        record.halftime_draw_odds = obs.odds.draw;
                    }
                    info!(
                        "Favorite {} trailing at {} in {} vs {} ({}-{})",
                        record.favorite_team(),
                        obs.phase.phase.as_str(),
                        record.home_team,
                        record.away_team,
                        obs.score.home,
                        obs.score.away
                    );
                }

                record.updated_at = now;
                self.store.upsert(&record).await?;
                Ok(Applied::Updated)
            }
            None => {
                if obs.terminal.is_some() {
                    return Ok(Applied::NotTracked);
                }
                // Live odds stand in for the pre-match price we never saw.
                let Some((home_odds, away_odds)) = obs.odds.pair() else {
                    return Ok(Applied::NotTracked);
                };

                let favorite = Side::favorite(home_odds, away_odds);
                let status = obs.status();
                let trailing = status == MatchStatus::Halftime && is_favorite_trailing(favorite, obs.score);
                let snapshot = if trailing { obs.odds } else { OddsTriple::default() };

                let record = Match {
                    event_id: obs.event_id,
                    sport,
                    home_team: obs.home_team,
                    away_team: obs.away_team,
                    league_name: obs.league_name,
                    start_time: now - Duration::minutes(SYNTHESIZED_START_OFFSET_MINUTES),
                    pre_match_home_odds: home_odds,
                    pre_match_away_odds: away_odds,
                    pre_match_draw_odds: obs.odds.draw,
                    pre_match_favorite: favorite,
                    status,
                    current_score_home: obs.score.home,
                    current_score_away: obs.score.away,
                    halftime_home_odds: snapshot.home,
                    halftime_away_odds: snapshot.away,
                    halftime_draw_odds: snapshot.draw,
                    favorite_trailing_at_halftime: trailing,
                    // The start window has necessarily passed.
                    start_notification_sent: true,
                    halftime_notification_sent: false,
                    created_at: now,
                    updated_at: now,
                };
                self.store.upsert(&record).await?;
                debug!(
                    "Created {} match {} from live data ({})",
                    sport,
                    record.event_id,
                    record.status
                );
                Ok(Applied::CreatedFromLive)
            }
        }
    }
}
