//! Outcome model: common result format for delivery attempts.
//!
//! This module is backend-agnostic: it only defines the "shape" of results
//! the engine can record against a target row and explain later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DeliveryError;
use super::item::TargetStatus;

/// What a backend hands back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivered {
    /// Identifier assigned by the backend (post id, URI, ...).
    pub external_id: String,

    /// Public URL of the delivered content, when the backend knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Delivered {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// One recorded result of trying (or deciding not to try) a target.
///
/// Tagged so the attempt log stays readable as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The backend accepted the content.
    Delivered {
        external_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        at: DateTime<Utc>,
    },

    /// The backend (or the engine, pre-call) reported a failure.
    Failed {
        error: DeliveryError,
        at: DateTime<Utc>,
    },

    /// The engine never invoked the backend for this round.
    Skipped { reason: String, at: DateTime<Utc> },
}

impl DeliveryOutcome {
    pub fn delivered(delivered: Delivered, at: DateTime<Utc>) -> Self {
        Self::Delivered {
            external_id: delivered.external_id,
            url: delivered.url,
            at,
        }
    }

    pub fn failed(error: DeliveryError, at: DateTime<Utc>) -> Self {
        Self::Failed { error, at }
    }

    pub fn skipped(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::Skipped {
            reason: reason.into(),
            at,
        }
    }

    /// The target status this outcome settles into.
    pub fn status(&self) -> TargetStatus {
        match self {
            Self::Delivered { .. } => TargetStatus::Published,
            Self::Failed { .. } => TargetStatus::Failed,
            Self::Skipped { .. } => TargetStatus::Skipped,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Delivered { at, .. } | Self::Failed { at, .. } | Self::Skipped { at, .. } => *at,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_target_status() {
        let at = Utc::now();
        assert_eq!(
            DeliveryOutcome::delivered(Delivered::new("post-1"), at).status(),
            TargetStatus::Published
        );
        assert_eq!(
            DeliveryOutcome::failed(DeliveryError::network("down"), at).status(),
            TargetStatus::Failed
        );
        assert_eq!(
            DeliveryOutcome::skipped("deadline exhausted", at).status(),
            TargetStatus::Skipped
        );
    }

    #[test]
    fn outcome_is_tagged_json() {
        let at = Utc::now();
        let o = DeliveryOutcome::delivered(Delivered::new("at://x/3k").with_url("https://e/3k"), at);
        let v: serde_json::Value = serde_json::to_value(&o).unwrap();
        assert_eq!(v["kind"], "delivered");
        assert_eq!(v["external_id"], "at://x/3k");
        assert_eq!(v["url"], "https://e/3k");

        let back: DeliveryOutcome = serde_json::from_value(v).unwrap();
        assert_eq!(back, o);
    }
}
