//! ContentStore port - the source of truth for items and target rows.
//!
//! # 設計原則
//! - 状態遷移（claim/release/aggregate）は単一アイテム内でアトミック
//! - The claim is the authority: a dispatcher that did not win `try_claim`
//!   must not invoke any backend for that item.
//! - The store enforces the publish-once invariant (`published_at` is
//!   written on the first publish and never again).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{ContentItem, DeliveryOutcome, InvalidItem, ItemId, ItemStatus, NewItem};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content item not found: {0}")]
    NotFound(ItemId),

    #[error("item {item} has no target named {target}")]
    UnknownTarget { item: ItemId, target: String },

    #[error("item {0} is not in a dispatching state")]
    NotClaimed(ItemId),

    #[error(transparent)]
    Invalid(#[from] InvalidItem),

    /// Backend-specific store failure (connection loss, etc.).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for content items and their per-target delivery rows.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Validate and persist a new item; returns its assigned id.
    async fn create(&self, new_item: NewItem) -> Result<ItemId, StoreError>;

    async fn get(&self, id: ItemId) -> Result<ContentItem, StoreError>;

    /// Scheduled items whose time has passed, earliest first. Claimed
    /// (Dispatching) items are invisible here by construction.
    async fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<ContentItem>, StoreError>;

    /// Items created on the given calendar day (UTC). The cadence
    /// scheduler's restart backstop.
    async fn query_created_on(&self, date: NaiveDate) -> Result<Vec<ContentItem>, StoreError>;

    /// Recent items, newest first, optionally filtered by status.
    async fn list(
        &self,
        status: Option<ItemStatus>,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError>;

    /// Atomically move a claimable item into Dispatching.
    ///
    /// Returns the prior status when this caller won the claim, `None` when
    /// the item is already Dispatching or is Archived.
    async fn try_claim(&self, id: ItemId) -> Result<Option<ItemStatus>, StoreError>;

    /// Return a claimed item to `prior` (a round that settled nothing).
    async fn release(&self, id: ItemId, prior: ItemStatus) -> Result<(), StoreError>;

    /// Append an outcome to one target row and sync its current fields.
    async fn update_target(
        &self,
        id: ItemId,
        target: &str,
        outcome: DeliveryOutcome,
    ) -> Result<(), StoreError>;

    /// Write the aggregate status. `published_at` is applied only if the
    /// item has never been published before.
    async fn update_aggregate(
        &self,
        id: ItemId,
        status: ItemStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}
