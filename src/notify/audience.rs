//! Who is entitled to hear about a sport.
//!
//! Match-start notices are free and go to every active user; halftime-trailing
//! alerts go only to subscribers of the match's sport.

use crate::error::NotifyError;
use crate::model::{NotificationKind, Sport};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt;

/// Opaque recipient address, e.g. a chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecipientRef(pub String);

impl fmt::Display for RecipientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait Audience: Send + Sync {
    /// At least one active subscriber follows `sport`.
    async fn has_entitled_audience(&self, sport: Sport) -> Result<bool, NotifyError>;

    /// Recipients of a `kind` notification about a `sport` match.
    async fn list_recipients(&self, sport: Sport, kind: NotificationKind) -> Result<Vec<RecipientRef>, NotifyError>;
}

/// Fixed recipient lists per sport. Every listed recipient counts as an active user.
#[derive(Debug, Clone, Default)]
pub struct StaticAudience {
    by_sport: HashMap<Sport, Vec<RecipientRef>>,
}

impl StaticAudience {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients(mut self, sport: Sport, ids: &[&str]) -> Self {
        let list = self.by_sport.entry(sport).or_default();
        for id in ids {
            let recipient = RecipientRef(id.to_string());
            if !list.contains(&recipient) {
                list.push(recipient);
            }
        }
        self
    }

    /// Parse `tennis:111,222;basketball:333`. The sport `all` expands to every sport.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut audience = Self::new();
        for group in list.split(';').map(str::trim).filter(|g| !g.is_empty()) {
            let (sport, ids) = group
                .split_once(':')
                .ok_or_else(|| format!("expected 'sport:id,...' but got '{}'", group))?;
            let ids: Vec<&str> = ids.split(',').map(str::trim).filter(|id| !id.is_empty()).collect();

            let sports: Vec<Sport> = if sport.trim().eq_ignore_ascii_case("all") {
                Sport::ALL.to_vec()
            } else {
                vec![sport.parse()?]
            };
            for sport in sports {
                audience = audience.with_recipients(sport, &ids);
            }
        }
        Ok(audience)
    }

    pub fn is_empty(&self) -> bool {
        self.by_sport.values().all(Vec::is_empty)
    }
}

#[async_trait]
impl Audience for StaticAudience {
    async fn has_entitled_audience(&self, sport: Sport) -> Result<bool, NotifyError> {
        Ok(self.by_sport.get(&sport).map_or(false, |list| !list.is_empty()))
    }

    async fn list_recipients(&self, sport: Sport, kind: NotificationKind) -> Result<Vec<RecipientRef>, NotifyError> {
        match kind {
            NotificationKind::HalftimeTrailing => Ok(self.by_sport.get(&sport).cloned().unwrap_or_default()),
            NotificationKind::MatchStart => {
                let mut everyone: Vec<RecipientRef> = Vec::new();
                for list in Sport::ALL.iter().filter_map(|s| self.by_sport.get(s)) {
                    for recipient in list {
                        if !everyone.contains(recipient) {
                            everyone.push(recipient.clone());
                        }
                    }
                }
                Ok(everyone)
            }
        }
    }
}

/// Subscribers read from the bot's `users` / `subscriptions` tables.
#[derive(Clone)]
pub struct PgAudience {
    db: PgPool,
}

const ENTITLED_FILTER: &str = r#"
    FROM users u
    JOIN subscriptions s ON s.user_id = u.id
    WHERE u.is_active
      AND s.is_active
      AND s.end_date > NOW()
      AND (s.plan_type = 'full_access' OR s.sports::jsonb ? $1)
"#;

const ACTIVE_USERS: &str = "SELECT DISTINCT telegram_id FROM users WHERE is_active";

impl PgAudience {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Audience for PgAudience {
    async fn has_entitled_audience(&self, sport: Sport) -> Result<bool, NotifyError> {
        let sql = format!("SELECT EXISTS(SELECT 1 {})", ENTITLED_FILTER);
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(sport.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(|e| NotifyError::Audience(e.to_string()))
    }

    async fn list_recipients(&self, sport: Sport, kind: NotificationKind) -> Result<Vec<RecipientRef>, NotifyError> {
        let ids: Vec<String> = match kind {
            NotificationKind::MatchStart => sqlx::query_scalar::<_, String>(ACTIVE_USERS).fetch_all(&self.db).await,
            NotificationKind::HalftimeTrailing => {
                let sql = format!("SELECT DISTINCT u.telegram_id {}", ENTITLED_FILTER);
                sqlx::query_scalar::<_, String>(&sql).bind(sport.as_str()).fetch_all(&self.db).await
            }
        }
        .map_err(|e| NotifyError::Audience(e.to_string()))?;
        Ok(ids.into_iter().map(RecipientRef).collect())
    }
}
