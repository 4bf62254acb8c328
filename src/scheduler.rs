//! Outer polling loop.
//!
//! Each cycle walks the monitored sports in order, fetching upcoming then
//! in-play events and committing them through the tracker. Sleep is adaptive
//! (short while anything is in play), failed cycles back off, and every N
//! cycles finished rows past the retention horizon are removed.

use crate::health::HealthState;
use crate::model::{MatchStatus, Sport};
use crate::provider::{FetchLimit, OddsProvider};
use crate::store::MatchQuery;
use crate::tracker::{BatchSummary, MatchTracker};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const MIN_SLEEP: Duration = Duration::from_secs(1);
const SUMMARY_EVERY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub sports: Vec<Sport>,
    pub upcoming_limit: FetchLimit,
    pub in_play_limit: FetchLimit,
    pub live_poll: Duration,
    pub idle_poll: Duration,
    pub error_backoff: Duration,
    pub cleanup_every_cycles: u64,
    pub retention: ChronoDuration,
    pub stale_live: ChronoDuration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sports: Sport::ALL.to_vec(),
            upcoming_limit: FetchLimit::Count(20),
            in_play_limit: FetchLimit::All,
            live_poll: Duration::from_secs(15),
            idle_poll: Duration::from_secs(60),
            error_backoff: Duration::from_secs(60),
            cleanup_every_cycles: 20,
            retention: ChronoDuration::hours(24),
            stale_live: ChronoDuration::hours(6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    FetchingUpcoming(Sport),
    FetchingInPlay(Sport),
    Committing(Sport),
    Sleeping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub stale_finished: u64,
    pub deleted: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub batch: BatchSummary,
    pub tracked: u64,
    pub live: u64,
    pub cleanup: Option<CleanupReport>,
    /// The token fired mid-cycle; remaining sports were skipped.
    pub cancelled: bool,
}

impl CycleReport {
    pub fn any_live(&self) -> bool {
        self.live > 0
    }
}

/// Sleep before the next cycle: the short interval while anything is in play,
/// minus time already spent, never below one second.
pub fn next_sleep(any_live: bool, elapsed: Duration, settings: &SchedulerSettings) -> Duration {
    let base = if any_live {
        settings.live_poll
    } else {
        settings.idle_poll
    };
    base.saturating_sub(elapsed).max(MIN_SLEEP)
}

pub struct PollingScheduler {
    tracker: MatchTracker,
    provider: Arc<dyn OddsProvider>,
    settings: SchedulerSettings,
    health: HealthState,
    state: SchedulerState,
    cycles: u64,
    last_summary: Option<Instant>,
}

impl PollingScheduler {
    pub fn new(
        tracker: MatchTracker,
        provider: Arc<dyn OddsProvider>,
        mut settings: SchedulerSettings,
        health: HealthState,
    ) -> Self {
        settings.error_backoff = settings.error_backoff.max(MIN_SLEEP);
        Self {
            tracker,
            provider,
            settings,
            health,
            state: SchedulerState::Idle,
            cycles: 0,
            last_summary: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn enter(&mut self, state: SchedulerState) {
        debug!("Scheduler: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run one cycle over every monitored sport.
    pub async fn tick(&mut self, token: &CancellationToken, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycles += 1;
        let mut report = CycleReport::default();
        let sports = self.settings.sports.clone();

        for sport in sports {
            self.enter(SchedulerState::FetchingUpcoming(sport));
            let provider = self.provider.clone();
            let limit = self.settings.upcoming_limit;
            let Some(upcoming) =
                fetch_or_empty(token, sport, "upcoming", provider.fetch_upcoming(sport, limit)).await
            else {
                report.cancelled = true;
                break;
            };

            self.enter(SchedulerState::FetchingInPlay(sport));
            let limit = self.settings.in_play_limit;
            let Some(in_play) =
                fetch_or_empty(token, sport, "in-play", provider.fetch_in_play(sport, limit)).await
            else {
                report.cancelled = true;
                break;
            };

            self.enter(SchedulerState::Committing(sport));
            let summary = self.tracker.ingest_batch(sport, &upcoming, &in_play, now).await;
            if summary.failed > 0 {
                warn!("{}: {} of {} events skipped", sport, summary.failed, summary.observed);
            }
            report.batch.absorb(summary);
        }

        if self.settings.cleanup_every_cycles > 0 && self.cycles % self.settings.cleanup_every_cycles == 0 {
            report.cleanup = Some(self.cleanup(now).await?);
        }

        let store = self.tracker.store();
        report.tracked = store
            .count(&MatchQuery::new())
            .await
            .context("Failed to count tracked matches")?;
        report.live = store
            .count(&MatchQuery::new().statuses(&[MatchStatus::Live, MatchStatus::Halftime]))
            .await
            .context("Failed to count live matches")?;

        self.maybe_log_summary(&report);
        self.enter(SchedulerState::Idle);
        Ok(report)
    }

    /// Mark long-silent live matches finished, then delete terminal rows past retention.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let store = self.tracker.store();

        let stale = MatchQuery::new()
            .statuses(&[MatchStatus::Live, MatchStatus::Halftime])
            .updated_before(now - self.settings.stale_live);
        let stale_finished = store
            .set_status(&stale, MatchStatus::Finished, now)
            .await
            .context("Failed to close stale live matches")?;

        let expired = MatchQuery::new()
            .statuses(&[MatchStatus::Finished, MatchStatus::Cancelled])
            .updated_before(now - self.settings.retention);
        let deleted = store
            .delete(&expired)
            .await
            .context("Failed to delete expired matches")?;

        if stale_finished > 0 || deleted > 0 {
            info!(
                "Cleanup: closed {} stale live matches, deleted {} old matches",
                stale_finished, deleted
            );
        }
        Ok(CleanupReport {
            stale_finished,
            deleted,
        })
    }

    fn maybe_log_summary(&mut self, report: &CycleReport) {
        let due = self
            .last_summary
            .map_or(true, |at| at.elapsed() >= SUMMARY_EVERY);
        if !due {
            return;
        }
        self.last_summary = Some(Instant::now());
        info!(
            "Tracking summary: {} matches, {} live, {} created from live this cycle (cycle {})",
            report.tracked, report.live, report.batch.created_from_live, self.cycles
        );
    }

    /// Loop until the token is cancelled. Failed cycles never end the loop.
    pub async fn run(&mut self, token: CancellationToken) {
        info!(
            "Starting polling loop for {:?} (live {:?}, idle {:?})",
            self.settings.sports, self.settings.live_poll, self.settings.idle_poll
        );

        loop {
            let started = Instant::now();
            let pause = match self.tick(&token, Utc::now()).await {
                Ok(report) => {
                    if report.cancelled {
                        break;
                    }
                    self.health
                        .record_success(report.batch.observed, report.tracked, report.live)
                        .await;
                    debug!(
                        "Cycle {} done in {:?}: {:?}",
                        self.cycles,
                        started.elapsed(),
                        report.batch
                    );
                    next_sleep(report.any_live(), started.elapsed(), &self.settings)
                }
                Err(e) => {
                    self.health.record_error().await;
                    error!(
                        "Polling cycle failed ({} consecutive): {:?}",
                        self.health.consecutive_errors().await,
                        e
                    );
                    self.settings.error_backoff
                }
            };

            self.enter(SchedulerState::Sleeping);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.enter(SchedulerState::Idle);
        info!("Polling loop stopped after {} cycles", self.cycles);
    }
}

/// Await a fetch unless the token fires first. Provider errors degrade to an
/// empty batch; `None` means cancelled.
async fn fetch_or_empty<F>(
    token: &CancellationToken,
    sport: Sport,
    what: &str,
    fetch: F,
) -> Option<Vec<Value>>
where
    F: Future<Output = Result<Vec<Value>, crate::error::ProviderError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = fetch => Some(match result {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to fetch {} {} events: {}", what, sport, e);
                Vec::new()
            }
        }),
    }
}
