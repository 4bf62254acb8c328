//! In-process store, used when no database is configured and by the tests.

use super::{MatchQuery, MatchStore};
use crate::error::StoreResult;
use crate::model::{Match, MatchStatus, NotificationKind, NotificationLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    matches: Arc<RwLock<HashMap<String, Match>>>,
    logs: Arc<RwLock<Vec<NotificationLog>>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the notification audit log, oldest first.
    pub async fn notification_logs(&self) -> Vec<NotificationLog> {
        self.logs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn get(&self, event_id: &str) -> StoreResult<Option<Match>> {
        Ok(self.matches.read().await.get(event_id).cloned())
    }

    async fn upsert(&self, record: &Match) -> StoreResult<Match> {
        let mut matches = self.matches.write().await;
        let stored = match matches.get(&record.event_id) {
            Some(existing) => record.clone().merged_onto(existing),
            None => record.clone(),
        };
        matches.insert(stored.event_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn list(&self, query: &MatchQuery) -> StoreResult<Vec<Match>> {
        let matches = self.matches.read().await;
        let mut rows: Vec<Match> = matches.values().filter(|m| query.matches(m)).cloned().collect();
        rows.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(rows)
    }

    async fn count(&self, query: &MatchQuery) -> StoreResult<u64> {
        let matches = self.matches.read().await;
        Ok(matches.values().filter(|m| query.matches(m)).count() as u64)
    }

    async fn delete(&self, query: &MatchQuery) -> StoreResult<u64> {
        let mut matches = self.matches.write().await;
        let before = matches.len();
        matches.retain(|_, m| !query.matches(m));
        Ok((before - matches.len()) as u64)
    }

    async fn set_status(
        &self,
        query: &MatchQuery,
        status: MatchStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut matches = self.matches.write().await;
        let mut changed = 0;
        for m in matches.values_mut().filter(|m| query.matches(m)) {
            m.status = status;
            m.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn mark_notification_sent(
        &self,
        event_id: &str,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        let mut matches = self.matches.write().await;
        let Some(m) = matches.get_mut(event_id) else {
            return Ok(false);
        };
        match kind {
            NotificationKind::MatchStart => m.start_notification_sent = true,
            NotificationKind::HalftimeTrailing => m.halftime_notification_sent = true,
        }
        m.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_notification(&self, log: &NotificationLog) -> StoreResult<()> {
        self.logs.write().await.push(log.clone());
        Ok(())
    }
}
