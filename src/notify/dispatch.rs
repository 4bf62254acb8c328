//! Selection, fan-out and dedup of one-time notifications.

use super::audience::Audience;
use super::render::render;
use super::sink::Notifier;
use crate::error::NotifyError;
use crate::model::{Match, MatchStatus, NotificationKind, NotificationLog, Sport};
use crate::scheduler::MIN_SLEEP;
use crate::store::{MatchQuery, MatchStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Look-ahead window before kickoff, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartWindow {
    pub from_minutes: i64,
    pub to_minutes: i64,
}

impl Default for StartWindow {
    fn default() -> Self {
        Self {
            from_minutes: 25,
            to_minutes: 35,
        }
    }
}

impl StartWindow {
    /// Parse `"25-35"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (from, to) = s.split_once('-')?;
        let from_minutes: i64 = from.trim().parse().ok()?;
        let to_minutes: i64 = to.trim().parse().ok()?;
        (from_minutes >= 0 && from_minutes <= to_minutes).then_some(Self {
            from_minutes,
            to_minutes,
        })
    }

    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + ChronoDuration::minutes(self.from_minutes),
            now + ChronoDuration::minutes(self.to_minutes),
        )
    }
}

/// Finds matches owed a notification whose sticky flag is still unset.
#[derive(Clone)]
pub struct NotificationSelector {
    store: Arc<dyn MatchStore>,
    audience: Arc<dyn Audience>,
    start_window: StartWindow,
}

impl NotificationSelector {
    pub fn new(store: Arc<dyn MatchStore>, audience: Arc<dyn Audience>, start_window: StartWindow) -> Self {
        Self {
            store,
            audience,
            start_window,
        }
    }

    pub async fn select_match_start(&self, now: DateTime<Utc>) -> Result<Vec<Match>> {
        let (from, to) = self.start_window.bounds(now);
        let query = MatchQuery::new()
            .statuses(&[MatchStatus::Scheduled])
            .starting_between(from, to)
            .not_notified(NotificationKind::MatchStart);
        self.with_audience(query).await
    }

    pub async fn select_halftime_trailing(&self) -> Result<Vec<Match>> {
        let query = MatchQuery::new()
            .statuses(&[MatchStatus::Halftime])
            .favorite_trailing(true)
            .not_notified(NotificationKind::HalftimeTrailing);
        self.with_audience(query).await
    }

    async fn with_audience(&self, query: MatchQuery) -> Result<Vec<Match>> {
        let candidates = self.store.list(&query).await.context("Failed to list candidates")?;

        // One audience lookup per sport per pass.
        let mut entitled: HashMap<Sport, bool> = HashMap::new();
        let mut selected = Vec::with_capacity(candidates.len());
        for m in candidates {
            let has_audience = match entitled.get(&m.sport) {
                Some(known) => *known,
                None => {
                    let known = self.audience.has_entitled_audience(m.sport).await?;
                    entitled.insert(m.sport, known);
                    known
                }
            };
            if has_audience {
                selected.push(m);
            }
        }
        Ok(selected)
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: u32,
    pub failed: u32,
    pub flag_marked: bool,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn MatchStore>,
    audience: Arc<dyn Audience>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn MatchStore>, audience: Arc<dyn Audience>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            audience,
            notifier,
        }
    }

    /// Render once, send to every recipient for `kind`, log the attempt, then set the
    /// sticky flag. The flag is set even when every send failed.
    pub async fn dispatch(&self, m: &Match, kind: NotificationKind) -> Result<DispatchReport> {
        let recipients = self.audience.list_recipients(m.sport, kind).await?;
        let text = render(m, kind);

        let mut sent = 0u32;
        let mut failures: Vec<NotifyError> = Vec::new();
        for recipient in &recipients {
            match self.notifier.send(recipient, &text).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("Failed to notify {} about {}: {}", recipient, m.event_id, e);
                    failures.push(e);
                }
            }
        }
        let failed = failures.len() as u32;

        let log = NotificationLog {
            id: Uuid::new_v4(),
            event_id: m.event_id.clone(),
            channel_type: kind.channel(),
            notification_type: kind,
            content: text,
            sent_count: sent,
            failed_count: failed,
            success: sent > 0,
            error_message: failures.first().map(ToString::to_string),
            sent_at: Utc::now(),
        };
        if let Err(e) = self.store.record_notification(&log).await {
            // Dedup relies on the sticky flag, not on the audit row.
            warn!("Failed to record {} notification for {}: {}", kind, m.event_id, e);
        }

        let flag_marked = self
            .store
            .mark_notification_sent(&m.event_id, kind)
            .await
            .context("Failed to mark notification as sent")?;

        info!(
            "{} notification for {} vs {}: sent {}, failed {}",
            kind, m.home_team, m.away_team, sent, failed
        );
        Ok(DispatchReport {
            sent,
            failed,
            flag_marked,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub match_start: usize,
    pub halftime_trailing: usize,
    pub failed: usize,
}

/// Independent cadence that drains both selectors through the dispatcher.
pub struct NotificationLoop {
    selector: NotificationSelector,
    dispatcher: NotificationDispatcher,
    interval: Duration,
    error_backoff: Duration,
}

impl NotificationLoop {
    pub fn new(
        selector: NotificationSelector,
        dispatcher: NotificationDispatcher,
        interval: Duration,
        error_backoff: Duration,
    ) -> Self {
        Self {
            selector,
            dispatcher,
            interval: interval.max(MIN_SLEEP),
            error_backoff: error_backoff.max(MIN_SLEEP),
        }
    }

    /// One selection + dispatch pass. A failure on one match does not stop the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        let mut summary = PassSummary::default();

        let starting = self.selector.select_match_start(now).await?;
        for m in &starting {
            match self.dispatcher.dispatch(m, NotificationKind::MatchStart).await {
                Ok(_) => summary.match_start += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!("Match-start dispatch for {} failed: {:?}", m.event_id, e);
                }
            }
        }

        let trailing = self.selector.select_halftime_trailing().await?;
        for m in &trailing {
            match self.dispatcher.dispatch(m, NotificationKind::HalftimeTrailing).await {
                Ok(_) => summary.halftime_trailing += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!("Halftime dispatch for {} failed: {:?}", m.event_id, e);
                }
            }
        }

        if summary != PassSummary::default() {
            debug!("Notification pass: {:?}", summary);
        }
        Ok(summary)
    }

    pub async fn run(&self, token: CancellationToken) {
        info!("Starting notification loop (interval: {:?})", self.interval);
        loop {
            let pause = match self.tick(Utc::now()).await {
                Ok(_) => self.interval,
                Err(e) => {
                    error!("Notification pass failed: {:?}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        info!("Notification loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::scheduled_match;
    use crate::notify::audience::{RecipientRef, StaticAudience};
    use crate::store::MemoryMatchStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail_for: Vec<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, recipient: &RecipientRef, message: &str) -> Result<(), NotifyError> {
            if self.fail_for.contains(&recipient.0) {
                return Err(NotifyError::Delivery {
                    recipient: recipient.0.clone(),
                    reason: "blocked".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient.0.clone(), message.to_string()));
            Ok(())
        }
    }

    fn trailing_match(event_id: &str) -> Match {
        let mut m = scheduled_match(event_id, Sport::Basketball, Utc::now() - ChronoDuration::minutes(40));
        m.status = MatchStatus::Halftime;
        m.current_score_home = 40;
        m.current_score_away = 45;
        m.favorite_trailing_at_halftime = true;
        m.start_notification_sent = true;
        m
    }

    struct Harness {
        store: MemoryMatchStore,
        notifier: Arc<RecordingNotifier>,
        selector: NotificationSelector,
        dispatcher: NotificationDispatcher,
    }

    fn harness(audience: StaticAudience, notifier: RecordingNotifier) -> Harness {
        let store = MemoryMatchStore::new();
        let notifier = Arc::new(notifier);
        let audience: Arc<dyn Audience> = Arc::new(audience);
        let shared: Arc<dyn MatchStore> = Arc::new(store.clone());
        Harness {
            selector: NotificationSelector::new(shared.clone(), audience.clone(), StartWindow::default()),
            dispatcher: NotificationDispatcher::new(shared, audience, notifier.clone()),
            store,
            notifier,
        }
    }

    #[test]
    fn start_window_parsing() {
        assert_eq!(StartWindow::parse("25-35"), Some(StartWindow::default()));
        assert_eq!(StartWindow::parse("40-30"), None);
        assert_eq!(StartWindow::parse("-5-10"), None);
    }

    #[tokio::test]
    async fn dedup_after_dispatch() {
        let h = harness(
            StaticAudience::new().with_recipients(Sport::Basketball, &["1", "2"]),
            RecordingNotifier::default(),
        );
        h.store.upsert(&trailing_match("ht")).await.unwrap();

        let selected = h.selector.select_halftime_trailing().await.unwrap();
        assert_eq!(selected.len(), 1);

        let report = h
            .dispatcher
            .dispatch(&selected[0], NotificationKind::HalftimeTrailing)
            .await
            .unwrap();
        assert_eq!(report.sent, 2);
        assert!(report.flag_marked);

        assert!(h.selector.select_halftime_trailing().await.unwrap().is_empty());

        let logs = h.store.notification_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].channel_type.as_str(), "premium");
        assert!(logs[0].success);
    }

    #[tokio::test]
    async fn failed_delivery_still_marks_flag() {
        let h = harness(
            StaticAudience::new().with_recipients(Sport::Basketball, &["blocked"]),
            RecordingNotifier {
                fail_for: vec!["blocked".to_string()],
                ..Default::default()
            },
        );
        h.store.upsert(&trailing_match("ht")).await.unwrap();

        let report = h
            .dispatcher
            .dispatch(&trailing_match("ht"), NotificationKind::HalftimeTrailing)
            .await
            .unwrap();
        assert_eq!((report.sent, report.failed), (0, 1));

        let logs = h.store.notification_logs().await;
        assert!(!logs[0].success);
        assert!(logs[0].error_message.as_deref().unwrap().contains("blocked"));
        assert!(h.selector.select_halftime_trailing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sports_without_audience_are_skipped() {
        let h = harness(
            StaticAudience::new().with_recipients(Sport::Tennis, &["1"]),
            RecordingNotifier::default(),
        );
        h.store.upsert(&trailing_match("ht")).await.unwrap();
        assert!(h.selector.select_halftime_trailing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn match_start_window() {
        let h = harness(
            StaticAudience::new().with_recipients(Sport::Tennis, &["1"]),
            RecordingNotifier::default(),
        );
        let now = Utc::now();
        for (id, minutes) in [("soon", 30), ("later", 50), ("now", 5)] {
            let m = scheduled_match(id, Sport::Tennis, now + ChronoDuration::minutes(minutes));
            h.store.upsert(&m).await.unwrap();
        }

        let selected = h.selector.select_match_start(now).await.unwrap();
        let ids: Vec<&str> = selected.iter().map(|m| m.event_id.as_str()).collect();
        assert_eq!(ids, vec!["soon"]);
    }

    #[tokio::test]
    async fn match_start_goes_to_all_users_and_trailing_to_subscribers() {
        let h = harness(
            StaticAudience::new()
                .with_recipients(Sport::Basketball, &["fan"])
                .with_recipients(Sport::Tennis, &["other"]),
            RecordingNotifier::default(),
        );
        let start = scheduled_match("start", Sport::Basketball, Utc::now() + ChronoDuration::minutes(30));
        h.store.upsert(&start).await.unwrap();
        h.store.upsert(&trailing_match("ht")).await.unwrap();

        let report = h
            .dispatcher
            .dispatch(&start, NotificationKind::MatchStart)
            .await
            .unwrap();
        assert_eq!(report.sent, 2);

        let report = h
            .dispatcher
            .dispatch(&trailing_match("ht"), NotificationKind::HalftimeTrailing)
            .await
            .unwrap();
        assert_eq!(report.sent, 1);

        let sent = h.notifier.sent.lock().unwrap();
        let start_recipients: Vec<&str> = sent[..2].iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(start_recipients, vec!["other", "fan"]);
        assert_eq!(sent[2].0, "fan");
    }

    #[test]
    fn zero_intervals_are_floored() {
        let h = harness(StaticAudience::new(), RecordingNotifier::default());
        let notifications = NotificationLoop::new(h.selector, h.dispatcher, Duration::ZERO, Duration::ZERO);
        assert_eq!(notifications.interval, MIN_SLEEP);
        assert_eq!(notifications.error_backoff, MIN_SLEEP);
    }

    #[tokio::test]
    async fn loop_tick_sends_each_kind_once() {
        let h = harness(
            StaticAudience::parse("all:7").unwrap(),
            RecordingNotifier::default(),
        );
        let now = Utc::now();
        h.store
            .upsert(&scheduled_match("start", Sport::Handball, now + ChronoDuration::minutes(28)))
            .await
            .unwrap();
        h.store.upsert(&trailing_match("ht")).await.unwrap();

        let notifications = NotificationLoop::new(
            h.selector.clone(),
            h.dispatcher.clone(),
            Duration::from_secs(30),
            Duration::from_secs(60),
        );
        let first = notifications.tick(now).await.unwrap();
        assert_eq!((first.match_start, first.halftime_trailing), (1, 1));

        let second = notifications.tick(now).await.unwrap();
        assert_eq!(second, PassSummary::default());
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
    }
}
