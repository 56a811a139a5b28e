//! ContentGenerator port - the autonomous path's content source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::topic_pool::Topic;

/// What the generator produces for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
}

impl GeneratedContent {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            media_ref: None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// No generation credentials configured; the operator has to act.
    #[error("no content-generation credentials configured")]
    MissingCredentials,

    #[error("content generation failed: {0}")]
    Failed(String),
}

/// Produces channel-appropriate content for a topic.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        topic: &Topic,
        channel: &str,
    ) -> Result<GeneratedContent, GenerateError>;
}
