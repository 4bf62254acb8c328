//! Postgres-backed store.

use super::{MatchQuery, MatchStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{Match, MatchStatus, NotificationKind, NotificationLog, Side, Sport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{info, warn};

const MATCH_COLUMNS: &str = r#"
    event_id, sport, home_team, away_team, league_name, start_time,
    pre_match_home_odds, pre_match_away_odds, pre_match_draw_odds, pre_match_favorite,
    status, current_score_home, current_score_away,
    halftime_home_odds, halftime_away_odds, halftime_draw_odds,
    favorite_trailing_at_halftime, start_notification_sent, halftime_notification_sent,
    created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    event_id: String,
    sport: String,
    home_team: String,
    away_team: String,
    league_name: String,
    start_time: DateTime<Utc>,
    pre_match_home_odds: f64,
    pre_match_away_odds: f64,
    pre_match_draw_odds: Option<f64>,
    pre_match_favorite: String,
    status: String,
    current_score_home: i32,
    current_score_away: i32,
    halftime_home_odds: Option<f64>,
    halftime_away_odds: Option<f64>,
    halftime_draw_odds: Option<f64>,
    favorite_trailing_at_halftime: bool,
    start_notification_sent: bool,
    halftime_notification_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MatchRow> for Match {
    type Error = StoreError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            event_id: row.event_id.clone(),
            reason,
        };
        let sport: Sport = row.sport.parse().map_err(corrupt)?;
        let pre_match_favorite: Side = row.pre_match_favorite.parse().map_err(corrupt)?;
        let status: MatchStatus = row.status.parse().map_err(corrupt)?;

        Ok(Match {
            event_id: row.event_id,
            sport,
            home_team: row.home_team,
            away_team: row.away_team,
            league_name: row.league_name,
            start_time: row.start_time,
            pre_match_home_odds: row.pre_match_home_odds,
            pre_match_away_odds: row.pre_match_away_odds,
            pre_match_draw_odds: row.pre_match_draw_odds,
            pre_match_favorite,
            status,
            current_score_home: row.current_score_home,
            current_score_away: row.current_score_away,
            halftime_home_odds: row.halftime_home_odds,
            halftime_away_odds: row.halftime_away_odds,
            halftime_draw_odds: row.halftime_draw_odds,
            favorite_trailing_at_halftime: row.favorite_trailing_at_halftime,
            start_notification_sent: row.start_notification_sent,
            halftime_notification_sent: row.halftime_notification_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgMatchStore {
    db: PgPool,
}

impl PgMatchStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self::new(pool));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "Failed to connect to database after {} attempts: {}",
                            max_retries,
                            e
                        ));
                    }
                    warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }

    /// Create tables when missing. Schema migrations are managed outside this service.
    ///
    /// The `tracked_` tables may share a database with the bot's own `users`,
    /// `subscriptions`, `matches` and `notification_logs`; they never touch those.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(MATCHES_DDL).execute(&self.db).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracked_matches_status ON tracked_matches(status)")
            .execute(&self.db)
            .await?;

        sqlx::query(LOGS_DDL).execute(&self.db).await?;

        Ok(())
    }
}

// Prefixed so they can live beside the bot's own tables.
const MATCHES_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS tracked_matches (
        event_id TEXT PRIMARY KEY,
        sport TEXT NOT NULL,
        home_team TEXT NOT NULL,
        away_team TEXT NOT NULL,
        league_name TEXT NOT NULL,
        start_time TIMESTAMPTZ NOT NULL,
        pre_match_home_odds DOUBLE PRECISION NOT NULL,
        pre_match_away_odds DOUBLE PRECISION NOT NULL,
        pre_match_draw_odds DOUBLE PRECISION,
        pre_match_favorite TEXT NOT NULL,
        status TEXT NOT NULL,
        current_score_home INTEGER NOT NULL DEFAULT 0,
        current_score_away INTEGER NOT NULL DEFAULT 0,
        halftime_home_odds DOUBLE PRECISION,
        halftime_away_odds DOUBLE PRECISION,
        halftime_draw_odds DOUBLE PRECISION,
        favorite_trailing_at_halftime BOOLEAN NOT NULL DEFAULT FALSE,
        start_notification_sent BOOLEAN NOT NULL DEFAULT FALSE,
        halftime_notification_sent BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const LOGS_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS tracked_notification_logs (
        id UUID PRIMARY KEY,
        event_id TEXT NOT NULL,
        channel_type TEXT NOT NULL,
        notification_type TEXT NOT NULL,
        content JSONB NOT NULL,
        sent_count INTEGER NOT NULL,
        failed_count INTEGER NOT NULL,
        success BOOLEAN NOT NULL,
        error_message TEXT,
        sent_at TIMESTAMPTZ NOT NULL
    )
"#;

const INSERT_LOG: &str = r#"
    INSERT INTO tracked_notification_logs (
        id, event_id, channel_type, notification_type, content,
        sent_count, failed_count, success, error_message, sent_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &MatchQuery) {
    qb.push(" WHERE TRUE");
    if !query.statuses.is_empty() {
        let mut statuses: Vec<String> =
            query.statuses.iter().map(|s| s.as_str().to_string()).collect();
        if query.statuses.contains(&MatchStatus::Finished) {
            statuses.push("completed".to_string());
        }
        qb.push(" AND status = ANY(").push_bind(statuses).push(")");
    }
    if let Some(sport) = query.sport {
        qb.push(" AND sport = ").push_bind(sport.as_str());
    }
    if let Some(from) = query.start_from {
        qb.push(" AND start_time >= ").push_bind(from);
    }
    if let Some(to) = query.start_to {
        qb.push(" AND start_time <= ").push_bind(to);
    }
    if let Some(cutoff) = query.updated_before {
        qb.push(" AND updated_at < ").push_bind(cutoff);
    }
    if let Some(trailing) = query.favorite_trailing {
        qb.push(" AND favorite_trailing_at_halftime = ").push_bind(trailing);
    }
    if let Some(sent) = query.start_notification_sent {
        qb.push(" AND start_notification_sent = ").push_bind(sent);
    }
    if let Some(sent) = query.halftime_notification_sent {
        qb.push(" AND halftime_notification_sent = ").push_bind(sent);
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn get(&self, event_id: &str) -> StoreResult<Option<Match>> {
        let row: Option<MatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tracked_matches WHERE event_id = $1",
            MATCH_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Match::try_from).transpose()
    }

    async fn upsert(&self, m: &Match) -> StoreResult<Match> {
        // Conflict rules mirror Match::merged_onto.
        let row: MatchRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO tracked_matches ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (event_id) DO UPDATE SET
                sport = EXCLUDED.sport,
                home_team = EXCLUDED.home_team,
                away_team = EXCLUDED.away_team,
                league_name = EXCLUDED.league_name,
                start_time = EXCLUDED.start_time,
                pre_match_home_odds = CASE WHEN tracked_matches.status = 'scheduled'
                    THEN EXCLUDED.pre_match_home_odds ELSE tracked_matches.pre_match_home_odds END,
                pre_match_away_odds = CASE WHEN tracked_matches.status = 'scheduled'
                    THEN EXCLUDED.pre_match_away_odds ELSE tracked_matches.pre_match_away_odds END,
                pre_match_draw_odds = CASE WHEN tracked_matches.status = 'scheduled'
                    THEN EXCLUDED.pre_match_draw_odds ELSE tracked_matches.pre_match_draw_odds END,
                pre_match_favorite = CASE WHEN tracked_matches.status = 'scheduled'
                    THEN EXCLUDED.pre_match_favorite ELSE tracked_matches.pre_match_favorite END,
                status = EXCLUDED.status,
                current_score_home = EXCLUDED.current_score_home,
                current_score_away = EXCLUDED.current_score_away,
                halftime_home_odds = CASE
                    WHEN tracked_matches.halftime_home_odds IS NULL AND tracked_matches.halftime_away_odds IS NULL
                    THEN EXCLUDED.halftime_home_odds ELSE tracked_matches.halftime_home_odds END,
                halftime_away_odds = CASE
                    WHEN tracked_matches.halftime_home_odds IS NULL AND tracked_matches.halftime_away_odds IS NULL
                    THEN EXCLUDED.halftime_away_odds ELSE tracked_matches.halftime_away_odds END,
                halftime_draw_odds = CASE
                    WHEN tracked_matches.halftime_home_odds IS NULL AND tracked_matches.halftime_away_odds IS NULL
                    THEN EXCLUDED.halftime_draw_odds ELSE tracked_matches.halftime_draw_odds END,
                favorite_trailing_at_halftime =
                    tracked_matches.favorite_trailing_at_halftime OR EXCLUDED.favorite_trailing_at_halftime,
                start_notification_sent =
                    tracked_matches.start_notification_sent OR EXCLUDED.start_notification_sent,
                halftime_notification_sent =
                    tracked_matches.halftime_notification_sent OR EXCLUDED.halftime_notification_sent,
                updated_at = EXCLUDED.updated_at
            RETURNING {cols}
            "#,
            cols = MATCH_COLUMNS
        ))
        .bind(&m.event_id)
        .bind(m.sport.as_str())
        .bind(&m.home_team)
        .bind(&m.away_team)
        .bind(&m.league_name)
        .bind(m.start_time)
        .bind(m.pre_match_home_odds)
        .bind(m.pre_match_away_odds)
        .bind(m.pre_match_draw_odds)
        .bind(m.pre_match_favorite.as_str())
        .bind(m.status.as_str())
        .bind(m.current_score_home)
        .bind(m.current_score_away)
        .bind(m.halftime_home_odds)
        .bind(m.halftime_away_odds)
        .bind(m.halftime_draw_odds)
        .bind(m.favorite_trailing_at_halftime)
        .bind(m.start_notification_sent)
        .bind(m.halftime_notification_sent)
        .bind(m.created_at)
        .bind(m.updated_at)
        .fetch_one(&self.db)
        .await?;

        Match::try_from(row)
    }

    async fn list(&self, query: &MatchQuery) -> StoreResult<Vec<Match>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM tracked_matches", MATCH_COLUMNS));
        push_filters(&mut qb, query);
        qb.push(" ORDER BY start_time, event_id");

        let rows: Vec<MatchRow> = qb.build_query_as().fetch_all(&self.db).await?;
        rows.into_iter().map(Match::try_from).collect()
    }

    async fn count(&self, query: &MatchQuery) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tracked_matches");
        push_filters(&mut qb, query);

        let (count,): (i64,) = qb.build_query_as().fetch_one(&self.db).await?;
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, query: &MatchQuery) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM tracked_matches");
        push_filters(&mut qb, query);

        let result = qb.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }

    async fn set_status(
        &self,
        query: &MatchQuery,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tracked_matches SET status = ");
        qb.push_bind(status.as_str())
            .push(", updated_at = ")
            .push_bind(now);
        push_filters(&mut qb, query);

        let result = qb.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }

    async fn mark_notification_sent(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        let column = match kind {
            NotificationKind::MatchStart => "start_notification_sent",
            NotificationKind::HalftimeTrailing => "halftime_notification_sent",
        };
        let result = sqlx::query(&format!(
            "UPDATE tracked_matches SET {} = TRUE, updated_at = NOW() WHERE event_id = $1",
            column
        ))
        .bind(event_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_notification(&self, log: &NotificationLog) -> StoreResult<()> {
        let content = serde_json::json!({
            "text": log.content,
            "sent_count": log.sent_count,
            "failed_count": log.failed_count,
        });

        sqlx::query(INSERT_LOG)
            .bind(log.id)
            .bind(&log.event_id)
            .bind(log.channel_type.as_str())
            .bind(log.notification_type.as_str())
            .bind(content)
            .bind(log.sent_count as i32)
            .bind(log.failed_count as i32)
            .bind(log.success)
            .bind(&log.error_message)
            .bind(log.sent_at)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
