//! Typed errors for the seams between the tracker and its collaborators.
//!
//! Orchestration code (config, bootstrap, scheduler) works in `anyhow::Result`;
//! these enums exist where callers need to tell failure classes apart.

use thiserror::Error;

/// A single raw event could not be turned into an observation.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("event has no usable id")]
    MissingEventId,
}

/// Upstream provider failures. All of them degrade to an empty batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row for event {event_id}: {reason}")]
    CorruptRow { event_id: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Delivery failure for one recipient.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("audience lookup failed: {0}")]
    Audience(String),
}

/// Failure while applying one raw event. The batch skips the item and continues.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
