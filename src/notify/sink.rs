//! Delivery backends.

use super::audience::RecipientRef;
use crate::error::NotifyError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{info, warn};

/// Stream the chat bot consumes outbound messages from.
pub const OUTBOUND_STREAM: &str = "notifications.outbound";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &RecipientRef, message: &str) -> Result<(), NotifyError>;
}

/// Hands messages to the bot process through a Redis stream.
#[derive(Clone)]
pub struct RedisStreamNotifier {
    redis: redis::aio::ConnectionManager,
    stream: String,
}

impl RedisStreamNotifier {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self {
            redis,
            stream: OUTBOUND_STREAM.to_string(),
        }
    }

    pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<Self> {
        let mut attempt = 0;
        loop {
            let result = match redis::Client::open(url) {
                Ok(client) => redis::aio::ConnectionManager::new(client).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(conn) => {
                    info!("Connected to Redis");
                    return Ok(Self::new(conn));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "Failed to connect to Redis after {} attempts: {}",
                            max_retries,
                            e
                        ));
                    }
                    warn!("Redis connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for RedisStreamNotifier {
    async fn send(&self, recipient: &RecipientRef, message: &str) -> Result<(), NotifyError> {
        let mut conn = self.redis.clone();
        let queued_at = Utc::now().to_rfc3339();
        let _: String = conn
            .xadd(
                &self.stream,
                "*",
                &[
                    ("recipient", recipient.0.as_str()),
                    ("parse_mode", "Markdown"),
                    ("text", message),
                    ("queued_at", queued_at.as_str()),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Dry-run backend: logs what would have been sent.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &RecipientRef, message: &str) -> Result<(), NotifyError> {
        info!(
            "[dry-run] notification for {}: {}",
            recipient,
            message.lines().next().unwrap_or_default()
        );
        Ok(())
    }
}
