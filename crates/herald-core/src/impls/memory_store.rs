//! InMemoryContentStore - 開発・テスト用のストア実装
//!
//! 本番用の実装（PostgreSQL など）は別クレートに置く前提。ここでは単一の
//! Mutex の中で全ての状態遷移を完結させることで、claim のアトミック性を
//! そのまま表現しています（ロック跨ぎ await しない）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::domain::{ContentItem, DeliveryOutcome, ItemId, ItemStatus, NewItem};
use crate::ports::{Clock, ContentStore, IdGenerator, StoreError};

struct StoreState {
    items: HashMap<ItemId, ContentItem>,

    /// Insertion order, for newest-first listings.
    order: Vec<ItemId>,
}

/// In-memory store with the same claim semantics a SQL implementation would
/// get from an atomic `UPDATE ... WHERE status NOT IN (...)`.
pub struct InMemoryContentStore {
    state: Mutex<StoreState>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryContentStore {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                items: HashMap::new(),
                order: Vec::new(),
            }),
            ids,
            clock,
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn create(&self, new_item: NewItem) -> Result<ItemId, StoreError> {
        new_item.validate()?;
        let id = self.ids.item_id();
        let item = new_item.into_item(id, self.clock.now());

        let mut state = self.state.lock().await;
        state.items.insert(id, item);
        state.order.push(id);
        Ok(id)
    }

    async fn get(&self, id: ItemId) -> Result<ContentItem, StoreError> {
        let state = self.state.lock().await;
        state.items.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<ContentItem>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<ContentItem> = state
            .items
            .values()
            .filter(|item| {
                item.status == ItemStatus::Scheduled
                    && item.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|item| item.scheduled_at);
        Ok(due)
    }

    async fn query_created_on(&self, date: NaiveDate) -> Result<Vec<ContentItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.created_at.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        status: Option<ItemStatus>,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.items.get(id))
            .filter(|item| status.is_none_or(|s| item.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn try_claim(&self, id: ItemId) -> Result<Option<ItemStatus>, StoreError> {
        let mut state = self.state.lock().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !item.status.is_claimable() {
            return Ok(None);
        }
        let prior = item.status;
        item.status = ItemStatus::Dispatching;
        Ok(Some(prior))
    }

    async fn release(&self, id: ItemId, prior: ItemStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if item.status != ItemStatus::Dispatching {
            return Err(StoreError::NotClaimed(id));
        }
        item.status = prior;
        Ok(())
    }

    async fn update_target(
        &self,
        id: ItemId,
        target: &str,
        outcome: DeliveryOutcome,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let row = item
            .target_mut(target)
            .ok_or_else(|| StoreError::UnknownTarget {
                item: id,
                target: target.to_string(),
            })?;
        row.record(outcome);
        Ok(())
    }

    async fn update_aggregate(
        &self,
        id: ItemId,
        status: ItemStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        item.status = status;
        // scheduled_at ⇔ Scheduled の不変条件を守る
        if !matches!(status, ItemStatus::Scheduled | ItemStatus::Dispatching) {
            item.scheduled_at = None;
        }
        // publish-once: the first publish wins, later ones keep the stamp
        if let Some(at) = published_at
            && item.published_at.is_none()
        {
            item.published_at = Some(at);
        }
        Ok(())
    }
}
