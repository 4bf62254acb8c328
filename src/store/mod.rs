//! Match persistence.
//!
//! The tracker only needs point lookup, an atomic insert-or-update keyed by
//! `event_id`, and list/count/delete by predicate. Both implementations apply
//! [`Match::merged_onto`] on conflict so sticky flags and frozen pre-match facts
//! survive concurrent writers.

mod memory;
mod postgres;

pub use memory::MemoryMatchStore;
pub use postgres::PgMatchStore;

use crate::error::StoreResult;
use crate::model::{Match, MatchStatus, NotificationKind, NotificationLog, Sport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Predicate over stored matches. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchQuery {
    pub statuses: Vec<MatchStatus>,
    pub sport: Option<Sport>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub favorite_trailing: Option<bool>,
    pub start_notification_sent: Option<bool>,
    pub halftime_notification_sent: Option<bool>,
}

impl MatchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(mut self, statuses: &[MatchStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn sport(mut self, sport: Sport) -> Self {
        self.sport = Some(sport);
        self
    }

    /// Start time within `[from, to]`.
    pub fn starting_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.start_from = Some(from);
        self.start_to = Some(to);
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn favorite_trailing(mut self, trailing: bool) -> Self {
        self.favorite_trailing = Some(trailing);
        self
    }

    /// Restrict to matches whose sticky flag for `kind` is still unset.
    pub fn not_notified(mut self, kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::MatchStart => self.start_notification_sent = Some(false),
            NotificationKind::HalftimeTrailing => self.halftime_notification_sent = Some(false),
        }
        self
    }

    pub fn matches(&self, m: &Match) -> bool {
        fn flag(expected: Option<bool>, actual: bool) -> bool {
            expected.map_or(true, |e| e == actual)
        }

        (self.statuses.is_empty() || self.statuses.contains(&m.status))
            && self.sport.map_or(true, |s| s == m.sport)
            && self.start_from.map_or(true, |t| m.start_time >= t)
            && self.start_to.map_or(true, |t| m.start_time <= t)
            && self.updated_before.map_or(true, |t| m.updated_at < t)
            && flag(self.favorite_trailing, m.favorite_trailing_at_halftime)
            && flag(self.start_notification_sent, m.start_notification_sent)
            && flag(self.halftime_notification_sent, m.halftime_notification_sent)
    }
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get(&self, event_id: &str) -> StoreResult<Option<Match>>;

    /// Insert or update by `event_id` as one atomic unit. Returns the row as stored.
    async fn upsert(&self, record: &Match) -> StoreResult<Match>;

    /// Matching rows ordered by start time.
    async fn list(&self, query: &MatchQuery) -> StoreResult<Vec<Match>>;

    async fn count(&self, query: &MatchQuery) -> StoreResult<u64>;

    async fn delete(&self, query: &MatchQuery) -> StoreResult<u64>;

    async fn set_status(
        &self,
        query: &MatchQuery,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Set the sticky flag for `kind`. Returns false when the event is unknown.
    async fn mark_notification_sent(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> StoreResult<bool>;

    async fn record_notification(&self, log: &NotificationLog) -> StoreResult<()>;
}
