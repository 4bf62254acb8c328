//! Favorite-trailing odds tracker.
//!
//! Polls the provider for upcoming and in-play tennis, basketball and handball
//! events, keeps per-match state in Postgres (or memory), and queues one-time
//! notifications onto a Redis stream for the chat bot.

use anyhow::{Context, Result};
use chrono::Utc;
use odds_tracker::config::Config;
use odds_tracker::health::{self, HealthState};
use odds_tracker::notify::{
    Audience, LogNotifier, NotificationDispatcher, NotificationLoop, NotificationSelector, Notifier,
    PgAudience, RedisStreamNotifier,
};
use odds_tracker::provider::B365Client;
use odds_tracker::scheduler::PollingScheduler;
use odds_tracker::store::{MatchStore, MemoryMatchStore, PgMatchStore};
use odds_tracker::tracker::MatchTracker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // A local .env is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("odds_tracker=info")),
        )
        .init();

    info!("Odds tracker v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let store: Arc<dyn MatchStore>;
    let audience: Arc<dyn Audience>;
    match &config.database_url {
        Some(url) => {
            let pg = PgMatchStore::connect_with_retry(url, CONNECT_RETRIES).await?;
            pg.ensure_schema().await.context("Failed to prepare schema")?;
            audience = if config.recipients.is_empty() {
                Arc::new(PgAudience::new(pg.pool().clone()))
            } else {
                Arc::new(config.recipients.clone())
            };
            store = Arc::new(pg);
        }
        None => {
            warn!("DATABASE_URL not set; match state is kept in memory only");
            store = Arc::new(MemoryMatchStore::new());
            audience = Arc::new(config.recipients.clone());
        }
    }

    let notifier: Arc<dyn Notifier> = match &config.redis_url {
        Some(url) => Arc::new(RedisStreamNotifier::connect_with_retry(url, CONNECT_RETRIES).await?),
        None => {
            warn!("REDIS_URL not set; notifications are logged, not delivered");
            Arc::new(LogNotifier)
        }
    };

    let provider = Arc::new(
        B365Client::new(
            &config.base_url,
            &config.api_token,
            config.fetch_timeout,
            config.requests_per_minute,
        )
        .context("Failed to create HTTP client")?,
    );

    let health_state = HealthState::new();
    let tracker = MatchTracker::new(store.clone(), config.thresholds);
    let mut scheduler = PollingScheduler::new(
        tracker,
        provider,
        config.scheduler.clone(),
        health_state.clone(),
    );
    let notifications = NotificationLoop::new(
        NotificationSelector::new(store.clone(), audience.clone(), config.start_window),
        NotificationDispatcher::new(store, audience, notifier),
        config.notification_interval,
        config.scheduler.error_backoff,
    );

    let token = CancellationToken::new();

    if config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        let report = scheduler.tick(&token, Utc::now()).await?;
        info!(
            "One-shot cycle: {} observed, {} tracked, {} live",
            report.batch.observed, report.tracked, report.live
        );
        let pass = notifications.tick(Utc::now()).await?;
        info!("One-shot notifications: {:?}", pass);
        return Ok(());
    }

    let health_addr = format!("0.0.0.0:{}", config.health_port);
    let listener = tokio::net::TcpListener::bind(&health_addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {}", health_addr))?;
    info!("Health endpoint listening on {}", health_addr);

    let server_token = token.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, health::router(health_state))
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("Health server error: {:?}", e);
        }
    });

    let notify_token = token.clone();
    let notifier_task = tokio::spawn(async move { notifications.run(notify_token).await });

    let shutdown_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                shutdown_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {:?}", e),
        }
    });

    scheduler.run(token.clone()).await;

    token.cancel();
    let _ = tokio::join!(notifier_task, server);
    info!("Stopped");
    Ok(())
}
