//! NotificationSink port - human-readable events for the operator.
//!
//! Fire-and-forget: implementations swallow their own failures. Nothing in
//! core state may ever depend on a notification landing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Error,
    Success,
    Info,
}

/// Receives operator-facing events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, kind: NotificationKind, title: &str, message: &str, link: &str);
}
