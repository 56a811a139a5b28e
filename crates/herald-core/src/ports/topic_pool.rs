//! TopicPool port - rotation source for autonomous content.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TopicId;

/// A subject the autonomous scheduler can write about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,

    /// How many times this topic has been picked.
    pub times_used: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("topic not found: {0}")]
    NotFound(TopicId),

    #[error("topic pool unavailable: {0}")]
    Unavailable(String),
}

/// Pool of topics ordered for round-robin coverage.
///
/// Selection order: ascending use count, then newest first among equals.
/// Repeatedly selecting + marking therefore visits the whole pool before
/// revisiting anything.
#[async_trait]
pub trait TopicPool: Send + Sync {
    /// The next topic in rotation; `None` when the pool is empty.
    async fn least_recently_used(&self) -> Result<Option<Topic>, TopicError>;

    /// Bump the use counter and stamp the use time.
    async fn mark_used(&self, id: TopicId) -> Result<(), TopicError>;

    /// Add a topic to the pool.
    async fn add(&self, title: &str) -> Result<TopicId, TopicError>;
}
