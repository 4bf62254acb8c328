//! Environment configuration.

use crate::model::Sport;
use crate::notify::{StartWindow, StaticAudience};
use crate::phase::{MinuteWindow, PhaseThresholds};
use crate::provider::{FetchLimit, DEFAULT_BASE_URL};
use crate::scheduler::SchedulerSettings;
use anyhow::{anyhow, Result};
use chrono::Duration as ChronoDuration;
use std::env;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct Config {
    pub api_token: String,
    pub base_url: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub fetch_timeout: Duration,
    pub requests_per_minute: NonZeroU32,
    pub scheduler: SchedulerSettings,
    pub thresholds: PhaseThresholds,
    pub start_window: StartWindow,
    pub notification_interval: Duration,
    pub recipients: StaticAudience,
    pub health_port: u16,
    /// If true, run one cycle of each loop and exit
    pub run_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_token = get("B365_API_TOKEN")
            .or_else(|| get("API_TOKEN"))
            .ok_or_else(|| anyhow!("B365_API_TOKEN is not set"))?;

        // Prevent accidental use of sample/placeholder tokens
        if is_placeholder(&api_token) {
            return Err(anyhow!(
                "B365_API_TOKEN appears to be a placeholder value; replace with your real token"
            ));
        }

        let defaults = SchedulerSettings::default();
        let default_thresholds = PhaseThresholds::default();

        let sports = match get("MONITORED_SPORTS") {
            Some(list) => parse_sports(&list)?,
            None => defaults.sports.clone(),
        };

        let recipients = match get("NOTIFY_RECIPIENTS") {
            Some(list) => StaticAudience::parse(&list).map_err(|e| anyhow!("NOTIFY_RECIPIENTS: {}", e))?,
            None => StaticAudience::new(),
        };

        let requests_per_minute = match get("PROVIDER_REQUESTS_PER_MINUTE") {
            Some(raw) => raw
                .parse::<NonZeroU32>()
                .map_err(|_| anyhow!("PROVIDER_REQUESTS_PER_MINUTE must be a positive integer, got {:?}", raw))?,
            None => NonZeroU32::new(120).ok_or_else(|| anyhow!("default request rate is zero"))?,
        };

        let scheduler = SchedulerSettings {
            sports,
            upcoming_limit: tunable(&get, "UPCOMING_LIMIT", FetchLimit::parse, defaults.upcoming_limit),
            in_play_limit: tunable(&get, "INPLAY_LIMIT", FetchLimit::parse, defaults.in_play_limit),
            live_poll: secs(&get, "LIVE_POLL_SECONDS", defaults.live_poll),
            idle_poll: secs(&get, "IDLE_POLL_SECONDS", defaults.idle_poll),
            error_backoff: secs(&get, "ERROR_BACKOFF_SECONDS", defaults.error_backoff),
            cleanup_every_cycles: number(&get, "CLEANUP_EVERY_CYCLES", defaults.cleanup_every_cycles),
            retention: hours(&get, "RETENTION_HOURS", defaults.retention),
            stale_live: hours(&get, "STALE_LIVE_HOURS", defaults.stale_live),
        };

        let thresholds = PhaseThresholds {
            basketball_halftime: tunable(
                &get,
                "BASKETBALL_HALFTIME_WINDOW",
                MinuteWindow::parse,
                default_thresholds.basketball_halftime,
            ),
            basketball_fourth_quarter_from: number(
                &get,
                "BASKETBALL_FOURTH_QUARTER_FROM",
                default_thresholds.basketball_fourth_quarter_from,
            ),
            handball_halftime: tunable(
                &get,
                "HANDBALL_HALFTIME_WINDOW",
                MinuteWindow::parse,
                default_thresholds.handball_halftime,
            ),
        };

        Ok(Self {
            api_token,
            base_url: get("B365_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            fetch_timeout: secs(&get, "FETCH_TIMEOUT_SECONDS", Duration::from_secs(20)),
            requests_per_minute,
            scheduler,
            thresholds,
            start_window: tunable(&get, "START_WINDOW_MINUTES", StartWindow::parse, StartWindow::default()),
            notification_interval: secs(&get, "NOTIFICATION_INTERVAL_SECONDS", Duration::from_secs(30)),
            recipients,
            health_port: number(&get, "HEALTH_PORT", 8083),
            run_once: get("RUN_ONCE").map_or(false, |v| v.eq_ignore_ascii_case("true")),
        })
    }
}

fn is_placeholder(token: &str) -> bool {
    let lower = token.to_lowercase();
    lower.contains("change_me")
        || lower.contains("your_")
        || lower.starts_with("sample")
        || lower == "token"
        || lower == "xxx"
}

fn parse_sports(list: &str) -> Result<Vec<Sport>> {
    let mut sports = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let sport: Sport = name.parse().map_err(|e| anyhow!("MONITORED_SPORTS: {}", e))?;
        if !sports.contains(&sport) {
            sports.push(sport);
        }
    }
    if sports.is_empty() {
        return Err(anyhow!("MONITORED_SPORTS is empty"));
    }
    Ok(sports)
}

/// Parse an optional tunable, falling back to `default` (with a warning) when unparseable.
fn tunable<G, T, P>(get: &G, key: &str, parse: P, default: T) -> T
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match get(key) {
        None => default,
        Some(raw) => parse(&raw).unwrap_or_else(|| {
            warn!("Ignoring unparseable {}={:?}; using default", key, raw);
            default
        }),
    }
}

fn number<G, T>(get: &G, key: &str, default: T) -> T
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    tunable(get, key, |raw| raw.parse().ok(), default)
}

fn secs<G>(get: &G, key: &str, default: Duration) -> Duration
where
    G: Fn(&str) -> Option<String>,
{
    tunable(get, key, |raw| raw.parse().ok().map(Duration::from_secs), default)
}

fn hours<G>(get: &G, key: &str, default: ChronoDuration) -> ChronoDuration
where
    G: Fn(&str) -> Option<String>,
{
    tunable(get, key, |raw| raw.parse().ok().map(ChronoDuration::hours), default)
}
