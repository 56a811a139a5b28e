//! Notification sink implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ports::{NotificationKind, NotificationSink};

/// Logs notifications through `tracing`; the default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, kind: NotificationKind, title: &str, message: &str, link: &str) {
        match kind {
            NotificationKind::Error => {
                tracing::warn!(title, message, link, "operator notification")
            }
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(title, message, link, "operator notification")
            }
        }
    }
}

/// One captured notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: String,
}

/// Captures notifications for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("events lock poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, kind: NotificationKind, title: &str, message: &str, link: &str) {
        self.events
            .lock()
            .expect("events lock poisoned")
            .push(NotificationEvent {
                kind,
                title: title.to_string(),
                message: message.to_string(),
                link: link.to_string(),
            });
    }
}
