//! Content generator implementations.

use async_trait::async_trait;

use crate::ports::{ContentGenerator, GenerateError, GeneratedContent, Topic};

/// Deterministic generator for development: fills a fixed template from the
/// topic and channel. Real AI-backed generators live behind the same trait
/// in their own crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(
        &self,
        topic: &Topic,
        channel: &str,
    ) -> Result<GeneratedContent, GenerateError> {
        Ok(GeneratedContent::new(format!(
            "[{channel}] {}: notes from the workshop",
            topic.title
        )))
    }
}
