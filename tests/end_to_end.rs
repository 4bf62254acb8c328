use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use odds_tracker::error::{NotifyError, ProviderError};
use odds_tracker::health::HealthState;
use odds_tracker::model::{MatchStatus, Side, Sport};
use odds_tracker::notify::{
    Audience, NotificationDispatcher, NotificationLoop, NotificationSelector, Notifier, RecipientRef,
    StartWindow, StaticAudience,
};
use odds_tracker::phase::PhaseThresholds;
use odds_tracker::provider::{FetchLimit, OddsProvider};
use odds_tracker::scheduler::{PollingScheduler, SchedulerSettings};
use odds_tracker::store::{MatchStore, MemoryMatchStore};
use odds_tracker::tracker::{Applied, MatchTracker};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct ScriptedProvider {
    upcoming: Mutex<Vec<Value>>,
    in_play: Mutex<Vec<Value>>,
}

impl ScriptedProvider {
    fn set_upcoming(&self, events: Vec<Value>) {
        *self.upcoming.lock().unwrap() = events;
    }

    fn set_in_play(&self, events: Vec<Value>) {
        *self.in_play.lock().unwrap() = events;
    }
}

#[async_trait]
impl OddsProvider for ScriptedProvider {
    async fn fetch_upcoming(&self, sport: Sport, _limit: FetchLimit) -> Result<Vec<Value>, ProviderError> {
        match sport {
            Sport::Tennis => Ok(self.upcoming.lock().unwrap().clone()),
            _ => Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }

    async fn fetch_in_play(&self, sport: Sport, _limit: FetchLimit) -> Result<Vec<Value>, ProviderError> {
        match sport {
            Sport::Tennis => Ok(self.in_play.lock().unwrap().clone()),
            _ => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct CollectingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn send(&self, recipient: &RecipientRef, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

fn tennis_odds(home: &str, away: &str) -> Value {
    json!({
        "FI": "9001",
        "main": {"sp": {"to_win_match": {"odds": [
            {"header": "1", "odds": home},
            {"header": "2", "odds": away}
        ]}}}
    })
}

fn upcoming_tennis(kickoff_unix: i64) -> Value {
    json!({
        "id": "9001",
        "time": kickoff_unix.to_string(),
        "time_status": "0",
        "league": {"id": "1", "name": "ATP Vienna"},
        "home": {"id": "10", "name": "Favorite_Player"},
        "away": {"id": "11", "name": "Underdog"},
        "odds": tennis_odds("1.50", "2.60")
    })
}

fn in_play_tennis(ss: &str, home: &str, away: &str) -> Value {
    json!({
        "id": "9001",
        "time_status": "1",
        "league": {"name": "ATP Vienna"},
        "home": {"name": "Favorite_Player"},
        "away": {"name": "Underdog"},
        "ss": ss,
        "odds": tennis_odds(home, away)
    })
}

struct Service {
    store: MemoryMatchStore,
    provider: Arc<ScriptedProvider>,
    notifier: Arc<CollectingNotifier>,
    scheduler: PollingScheduler,
    notifications: NotificationLoop,
}

fn service() -> Service {
    let store = MemoryMatchStore::new();
    let shared: Arc<dyn MatchStore> = Arc::new(store.clone());
    let provider = Arc::new(ScriptedProvider::default());
    let notifier = Arc::new(CollectingNotifier::default());
    let audience: Arc<dyn Audience> =
        Arc::new(StaticAudience::new().with_recipients(Sport::Tennis, &["chat-1", "chat-2"]));

    let scheduler = PollingScheduler::new(
        MatchTracker::new(shared.clone(), PhaseThresholds::default()),
        provider.clone(),
        SchedulerSettings::default(),
        HealthState::new(),
    );
    let notifications = NotificationLoop::new(
        NotificationSelector::new(shared.clone(), audience.clone(), StartWindow::default()),
        NotificationDispatcher::new(shared, audience, notifier.clone()),
        Duration::from_secs(30),
        Duration::from_secs(60),
    );

    Service {
        store,
        provider,
        notifier,
        scheduler,
        notifications,
    }
}

#[tokio::test]
async fn favorite_trailing_after_first_set_is_reported_once() {
    let mut svc = service();
    let token = CancellationToken::new();
    let now = Utc::now();
    let kickoff = now + ChronoDuration::minutes(30);

    // Pre-match: tracked as scheduled with the home side favored.
    svc.provider.set_upcoming(vec![upcoming_tennis(kickoff.timestamp())]);
    let report = assert_ok!(svc.scheduler.tick(&token, now).await);
    assert_eq!(report.batch.created, 1);
    assert!(!report.any_live());

    let m = svc.store.get("9001").await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Scheduled);
    assert_eq!(m.pre_match_favorite, Side::Home);
    assert_eq!(m.pre_match_home_odds, 1.5);
    assert_eq!(m.pre_match_draw_odds, None);

    // Thirty minutes out: the start notification goes to every recipient once.
    let pass = assert_ok!(svc.notifications.tick(now).await);
    assert_eq!(pass.match_start, 1);
    assert_eq!(svc.notifier.messages.lock().unwrap().len(), 2);

    // First set lost by the favorite.
    svc.provider.set_upcoming(Vec::new());
    svc.provider.set_in_play(vec![in_play_tennis("0-1", "2.90", "1.40")]);
    let report = assert_ok!(svc.scheduler.tick(&token, now).await);
    assert_eq!(report.live, 1);

    let m = svc.store.get("9001").await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Halftime);
    assert!(m.favorite_trailing_at_halftime);
    assert_eq!(m.halftime_home_odds, Some(2.9));
    assert_eq!(m.halftime_away_odds, Some(1.4));
    assert_eq!((m.current_score_home, m.current_score_away), (0, 1));

    let pass = assert_ok!(svc.notifications.tick(now).await);
    assert_eq!(pass.halftime_trailing, 1);
    let pass = assert_ok!(svc.notifications.tick(now).await);
    assert_eq!(pass.halftime_trailing, 0);

    {
        let messages = svc.notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages[3].1.contains("FAVORITE TRAILING AT FIRST SET"));
        assert!(messages[3].1.contains("Favorite\\_Player"));
    }

    // Later odds never replace the snapshot or the favorite.
    svc.provider.set_in_play(vec![in_play_tennis("1-1", "1.30", "3.40")]);
    assert_ok!(svc.scheduler.tick(&token, now).await);
    let m = svc.store.get("9001").await.unwrap().unwrap();
    assert_eq!(m.halftime_home_odds, Some(2.9));
    assert_eq!(m.pre_match_favorite, Side::Home);
    assert!(m.halftime_notification_sent);

    let logs = svc.store.notification_logs().await;
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.success && log.sent_count == 2));
}

#[tokio::test]
async fn repeated_upcoming_payload_keeps_one_row() {
    let store = MemoryMatchStore::new();
    let tracker = MatchTracker::new(Arc::new(store.clone()), PhaseThresholds::default());
    let now = Utc::now();
    let raw = upcoming_tennis((now + ChronoDuration::hours(3)).timestamp());

    assert_eq!(assert_ok!(tracker.ingest_upcoming(Sport::Tennis, &raw, now).await), Applied::Created);
    assert_eq!(assert_ok!(tracker.ingest_upcoming(Sport::Tennis, &raw, now).await), Applied::Refreshed);
    assert_eq!(store.len().await, 1);
    assert_eq!(store.get("9001").await.unwrap().unwrap().event_id, "9001");
}

#[tokio::test]
async fn payload_without_id_is_rejected() {
    let store = MemoryMatchStore::new();
    let tracker = MatchTracker::new(Arc::new(store.clone()), PhaseThresholds::default());
    assert_err!(tracker.ingest_in_play(Sport::Tennis, &json!({"ss": "1-0"}), Utc::now()).await);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn cleanup_respects_retention_horizon() {
    let mut svc = service();
    let token = CancellationToken::new();
    let now = Utc::now();

    let raw = upcoming_tennis((now - ChronoDuration::hours(40)).timestamp());
    let tracker = MatchTracker::new(Arc::new(svc.store.clone()), PhaseThresholds::default());
    assert_ok!(tracker.ingest_upcoming(Sport::Tennis, &raw, now).await);

    let mut old = svc.store.get("9001").await.unwrap().unwrap();
    old.status = MatchStatus::Finished;
    old.updated_at = now - ChronoDuration::hours(30);
    let mut recent = old.clone();
    recent.event_id = "9002".to_string();
    recent.updated_at = now - ChronoDuration::hours(2);
    assert_ok!(svc.store.upsert(&old).await);
    assert_ok!(svc.store.upsert(&recent).await);

    let cleaned = assert_ok!(svc.scheduler.cleanup(now).await);
    assert_eq!(cleaned.deleted, 1);
    assert!(svc.store.get("9001").await.unwrap().is_none());
    assert!(svc.store.get("9002").await.unwrap().is_some());

    // A regular cycle with nothing upstream leaves the retained row alone.
    let report = assert_ok!(svc.scheduler.tick(&token, now).await);
    assert_eq!(report.tracked, 1);
}
