//! `/health` endpoint and the cycle bookkeeping behind it.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

const DEGRADED_AFTER_ERRORS: usize = 5;
const UNAVAILABLE_AFTER_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct CycleStats {
    last_cycle_time: Option<DateTime<Utc>>,
    last_cycle_observed: usize,
    tracked_matches: u64,
    live_matches: u64,
    consecutive_errors: usize,
}

/// Shared between the scheduler (writer) and the HTTP handler (reader).
#[derive(Clone, Default)]
pub struct HealthState {
    inner: Arc<RwLock<CycleStats>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, observed: usize, tracked: u64, live: u64) {
        let mut stats = self.inner.write().await;
        stats.last_cycle_time = Some(Utc::now());
        stats.last_cycle_observed = observed;
        stats.tracked_matches = tracked;
        stats.live_matches = live;
        stats.consecutive_errors = 0;
    }

    pub async fn record_error(&self) {
        self.inner.write().await.consecutive_errors += 1;
    }

    pub async fn consecutive_errors(&self) -> usize {
        self.inner.read().await.consecutive_errors
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(health): State<HealthState>) -> (StatusCode, Json<Value>) {
    let stats = *health.inner.read().await;

    let status = if stats.consecutive_errors > DEGRADED_AFTER_ERRORS {
        "degraded"
    } else {
        "ok"
    };

    let http_status = if stats.consecutive_errors > UNAVAILABLE_AFTER_ERRORS {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": "odds-tracker",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_cycle": stats.last_cycle_time.map(|t| t.to_rfc3339()),
            "last_cycle_observed": stats.last_cycle_observed,
            "tracked_matches": stats.tracked_matches,
            "live_matches": stats.live_matches,
            "consecutive_errors": stats.consecutive_errors
        })),
    )
}
