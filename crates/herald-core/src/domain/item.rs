//! Content item record and status aggregation.
//!
//! Design: a single record owns its state, transitions happen via methods
//! (not direct field pokes), and the aggregate status is a pure function of
//! the per-target statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::attempt::DeliveryAttempt;
use super::ids::ItemId;
use super::outcome::DeliveryOutcome;

/// Lifecycle status of a content item.
///
/// State transitions:
/// - Draft | Scheduled -> Dispatching -> Published | Failed
/// - Dispatching -> (release) -> prior status, when a round settles nothing
/// - anything but Dispatching -> Archived (external user action)
///
/// `Dispatching` is the claim state: exactly one dispatcher may hold an item
/// at a time, so a scheduler tick and an on-demand publish can never both
/// invoke backends for the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Scheduled,
    Dispatching,
    Published,
    Failed,
    Archived,
}

impl ItemStatus {
    /// Can a dispatcher claim an item in this status?
    pub fn is_claimable(self) -> bool {
        !matches!(self, ItemStatus::Dispatching | ItemStatus::Archived)
    }
}

/// Status of one delivery target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Never attempted.
    Pending,

    /// The backend accepted the content. Never re-invoked after this.
    Published,

    /// The last attempt failed; eligible for the next round.
    Failed,

    /// The engine declined to invoke the backend this round
    /// (shared deadline exhausted before the target's turn).
    Skipped,
}

/// One delivery target of an item: registry key + latest outcome + history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDelivery {
    pub target: String,
    pub status: TargetStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Append-only log; `status` always mirrors the last entry.
    #[serde(default)]
    pub attempts: Vec<DeliveryAttempt>,
}

impl TargetDelivery {
    pub fn pending(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: TargetStatus::Pending,
            external_id: None,
            url: None,
            delivered_at: None,
            error: None,
            attempts: Vec::new(),
        }
    }

    /// Append an outcome and sync the current-row fields to it.
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match &outcome {
            DeliveryOutcome::Delivered {
                external_id,
                url,
                at,
            } => {
                self.external_id = Some(external_id.clone());
                self.url = url.clone();
                self.delivered_at = Some(*at);
                self.error = None;
            }
            DeliveryOutcome::Failed { error, .. } => {
                self.error = Some(error.to_string());
            }
            DeliveryOutcome::Skipped { reason, .. } => {
                self.error = Some(reason.clone());
            }
        }
        self.status = outcome.status();
        let seq = self.attempts.len() as u32 + 1;
        self.attempts.push(DeliveryAttempt::new(seq, outcome));
    }

    /// Current status derived from the log alone (cross-check for tests).
    pub fn derived_status(&self) -> TargetStatus {
        self.attempts
            .last()
            .map(|a| a.outcome.status())
            .unwrap_or(TargetStatus::Pending)
    }
}

/// How per-target statuses fold into one item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// One delivered target is enough: the item counts as published even if
    /// other targets failed. Used by the on-demand path.
    AnySuccess,

    /// Only a clean sweep settles the item. Mixed results leave it
    /// scheduled so the next tick retries the stragglers.
    AllOrNothing,
}

/// Aggregate status as a pure function of target statuses.
///
/// `None` means "leave the item as it is": under AllOrNothing that keeps a
/// partially-delivered item eligible for the next tick; under AnySuccess it
/// only happens when nothing succeeded and something was skipped.
pub fn aggregate(policy: AggregationPolicy, statuses: &[TargetStatus]) -> Option<ItemStatus> {
    if statuses.is_empty() {
        return None;
    }
    let any_published = statuses.iter().any(|s| *s == TargetStatus::Published);
    let all_published = statuses.iter().all(|s| *s == TargetStatus::Published);
    let all_failed = statuses.iter().all(|s| *s == TargetStatus::Failed);

    match policy {
        AggregationPolicy::AnySuccess => {
            if any_published {
                Some(ItemStatus::Published)
            } else if all_failed {
                Some(ItemStatus::Failed)
            } else {
                None
            }
        }
        AggregationPolicy::AllOrNothing => {
            if all_published {
                Some(ItemStatus::Published)
            } else if all_failed {
                Some(ItemStatus::Failed)
            } else {
                None
            }
        }
    }
}

/// A content item: payload + lifecycle + per-target delivery rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub body: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,

    pub status: ItemStatus,

    /// Present iff status is Scheduled (the claim state parks a scheduled
    /// item in Dispatching without clearing this; release restores the pair).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Written exactly once, the first time the aggregate becomes Published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub targets: Vec<TargetDelivery>,
}

impl ContentItem {
    /// Snapshot of current target statuses, in target order.
    pub fn target_statuses(&self) -> Vec<TargetStatus> {
        self.targets.iter().map(|t| t.status).collect()
    }

    pub fn target(&self, name: &str) -> Option<&TargetDelivery> {
        self.targets.iter().find(|t| t.target == name)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut TargetDelivery> {
        self.targets.iter_mut().find(|t| t.target == name)
    }
}

/// Creation input. Items are born Draft, or Scheduled when a time is given,
/// never Published/Failed/Archived directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub body: String,

    #[serde(default)]
    pub media_ref: Option<String>,

    /// Some -> the item is created Scheduled for this instant.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Target names, resolved against the backend registry at dispatch time.
    pub targets: Vec<String>,
}

impl NewItem {
    pub fn draft(body: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            body: body.into(),
            media_ref: None,
            scheduled_at: None,
            targets,
        }
    }

    pub fn scheduled(
        body: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            body: body.into(),
            media_ref: None,
            scheduled_at: Some(scheduled_at),
            targets,
        }
    }

    pub fn with_media(mut self, media_ref: impl Into<String>) -> Self {
        self.media_ref = Some(media_ref.into());
        self
    }

    /// Synchronous validation; bad input never reaches the engine.
    pub fn validate(&self) -> Result<(), InvalidItem> {
        if self.body.trim().is_empty() {
            return Err(InvalidItem::EmptyBody);
        }
        if self.scheduled_at.is_some() && self.targets.is_empty() {
            return Err(InvalidItem::NoTargets);
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.targets {
            if !seen.insert(t.as_str()) {
                return Err(InvalidItem::DuplicateTarget(t.clone()));
            }
        }
        Ok(())
    }

    /// Materialize the record (callers validate first).
    pub fn into_item(self, id: ItemId, created_at: DateTime<Utc>) -> ContentItem {
        let status = if self.scheduled_at.is_some() {
            ItemStatus::Scheduled
        } else {
            ItemStatus::Draft
        };
        ContentItem {
            id,
            body: self.body,
            media_ref: self.media_ref,
            status,
            scheduled_at: self.scheduled_at,
            published_at: None,
            created_at,
            targets: self
                .targets
                .into_iter()
                .map(TargetDelivery::pending)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidItem {
    #[error("item body is empty")]
    EmptyBody,

    #[error("scheduled item has no delivery targets")]
    NoTargets,

    #[error("duplicate delivery target: {0}")]
    DuplicateTarget(String),
}
