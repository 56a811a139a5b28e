//! Dispatch engine: deliver one item to its targets and reconcile.
//!
//! The engine owns the claim, the fan-out, the per-call time budget and the
//! status aggregation. It never invents state: everything it decides is a
//! pure function of the target rows it wrote through the store.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::domain::{
    AggregationPolicy, ContentItem, DeliveryError, DeliveryOutcome, ItemId, ItemStatus,
    TargetStatus, aggregate,
};
use crate::ports::{Clock, ContentStore, DeliveryRequest, StoreError};
use crate::registry::BackendRegistry;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Time budget for a single backend call.
    pub per_call_timeout: Duration,

    /// Shared deadline for one whole dispatch; targets whose turn comes
    /// after it are recorded Skipped without a call.
    pub deadline: Duration,

    /// Backend calls in flight at once per dispatch.
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(180),
            max_in_flight: 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("content item not found: {0}")]
    NotFound(ItemId),

    #[error("item {0} has no delivery targets")]
    NoTargets(ItemId),

    #[error("item {item} has no target named {target}")]
    UnknownTarget { item: ItemId, target: String },

    #[error("item {0} is already being dispatched")]
    Busy(ItemId),

    #[error("item {0} is archived")]
    Archived(ItemId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DispatchError::NotFound(id),
            other => DispatchError::Store(other),
        }
    }
}

/// Caller-facing report for one target row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full result of one dispatch: what each target row looks like now, plus
/// the settled aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub item_id: ItemId,
    pub any_success: bool,
    pub item_status: ItemStatus,
    pub per_target: Vec<TargetReport>,
}

impl AggregateResult {
    fn from_item(item: &ContentItem) -> Self {
        let per_target = item
            .targets
            .iter()
            .map(|row| TargetReport {
                target: row.target.clone(),
                success: row.status == TargetStatus::Published,
                external_id: row.external_id.clone(),
                url: row.url.clone(),
                error: row.error.clone(),
            })
            .collect::<Vec<_>>();
        Self {
            item_id: item.id,
            any_success: per_target.iter().any(|r| r.success),
            item_status: item.status,
            per_target,
        }
    }
}

/// Delivers one content item to N backends and reconciles the results.
pub struct DispatchEngine {
    store: Arc<dyn ContentStore>,
    registry: Arc<BackendRegistry>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        registry: Arc<BackendRegistry>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            config,
        }
    }

    /// Dispatch an item to all its targets under the given policy.
    ///
    /// Holds the claim for the whole round: a concurrent dispatcher gets
    /// [`DispatchError::Busy`] instead of double-delivering. Targets already
    /// Published are reported as-is and never re-invoked.
    pub async fn dispatch(
        &self,
        id: ItemId,
        policy: AggregationPolicy,
    ) -> Result<AggregateResult, DispatchError> {
        let item = self.store.get(id).await?;
        if item.targets.is_empty() {
            return Err(DispatchError::NoTargets(id));
        }
        if item.status == ItemStatus::Archived {
            return Err(DispatchError::Archived(id));
        }
        let Some(prior) = self.store.try_claim(id).await? else {
            return Err(DispatchError::Busy(id));
        };

        // snapshot the rows only after winning the claim
        let result = match self.store.get(id).await {
            Ok(item) => {
                let round = self.deliver_round(&item).await;
                self.settle(id, prior, policy, round).await
            }
            Err(err) => Err(err.into()),
        };

        // claim を持ったままでは戻らない
        match result {
            Ok(result) => Ok(result),
            Err(err) => {
                let _ = self.store.release(id, prior).await;
                Err(err)
            }
        }
    }

    /// The cadence path: deliver to exactly one named target. On success the
    /// item is published with the backend metadata; on failure it returns to
    /// its prior status (a fresh Draft stays Draft for the operator).
    pub async fn dispatch_single(
        &self,
        id: ItemId,
        target: &str,
    ) -> Result<AggregateResult, DispatchError> {
        let item = self.store.get(id).await?;
        if item.target(target).is_none() {
            return Err(DispatchError::UnknownTarget {
                item: id,
                target: target.to_string(),
            });
        }
        if item.status == ItemStatus::Archived {
            return Err(DispatchError::Archived(id));
        }
        let Some(prior) = self.store.try_claim(id).await? else {
            return Err(DispatchError::Busy(id));
        };

        let result: Result<AggregateResult, DispatchError> = async {
            // snapshot the row only after winning the claim
            let item = self.store.get(id).await?;
            let already_published = item
                .target(target)
                .is_some_and(|row| row.status == TargetStatus::Published);
            if already_published {
                // already out there; nothing to re-invoke
                self.store.release(id, prior).await?;
                return Ok(AggregateResult::from_item(&self.store.get(id).await?));
            }

            let deadline = Instant::now() + self.config.deadline;
            let request = DeliveryRequest {
                body: item.body.clone(),
                media_ref: item.media_ref.clone(),
            };
            let outcome = deliver_one(
                Arc::clone(&self.registry),
                Arc::clone(&self.clock),
                request,
                target.to_string(),
                self.config.per_call_timeout,
                deadline,
            )
            .await;

            let delivered = outcome.is_delivered();
            self.store.update_target(id, target, outcome).await?;
            if delivered {
                self.store
                    .update_aggregate(id, ItemStatus::Published, Some(self.clock.now()))
                    .await?;
            } else {
                self.store.release(id, prior).await?;
            }
            Ok(AggregateResult::from_item(&self.store.get(id).await?))
        }
        .await;

        match result {
            Ok(result) => Ok(result),
            Err(err) => {
                let _ = self.store.release(id, prior).await;
                Err(err)
            }
        }
    }

    /// Fan the item out to every non-published target and join the results.
    async fn deliver_round(&self, item: &ContentItem) -> Vec<(usize, String, DeliveryOutcome)> {
        let deadline = Instant::now() + self.config.deadline;
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut join_set = JoinSet::new();

        for (index, row) in item.targets.iter().enumerate() {
            // idempotence gate: a published target's backend is never
            // invoked again
            if row.status == TargetStatus::Published {
                continue;
            }

            let registry = Arc::clone(&self.registry);
            let clock = Arc::clone(&self.clock);
            let semaphore = Arc::clone(&semaphore);
            let target = row.target.clone();
            let request = DeliveryRequest {
                body: item.body.clone(),
                media_ref: item.media_ref.clone(),
            };
            let per_call = self.config.per_call_timeout;

            join_set.spawn(async move {
                // closed されない前提（エンジンが生きている間は drop しない）
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome =
                    deliver_one(registry, clock, request, target.clone(), per_call, deadline)
                        .await;
                (index, target, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(entry) => outcomes.push(entry),
                Err(err) => {
                    // a panicking backend task loses its slot; the row keeps
                    // its previous state and the next round retries it
                    tracing::error!(error = %err, "delivery task failed to join");
                }
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);
        outcomes
    }

    /// Write the round's outcomes and fold the rows into an item status.
    async fn settle(
        &self,
        id: ItemId,
        prior: ItemStatus,
        policy: AggregationPolicy,
        outcomes: Vec<(usize, String, DeliveryOutcome)>,
    ) -> Result<AggregateResult, DispatchError> {
        for (_, target, outcome) in outcomes {
            self.store.update_target(id, &target, outcome).await?;
        }

        let updated = self.store.get(id).await?;
        match aggregate(policy, &updated.target_statuses()) {
            Some(ItemStatus::Published) => {
                self.store
                    .update_aggregate(id, ItemStatus::Published, Some(self.clock.now()))
                    .await?;
            }
            Some(status) => {
                self.store.update_aggregate(id, status, None).await?;
            }
            None => {
                // settled nothing: the item stays what it was and the next
                // tick picks it up again
                self.store.release(id, prior).await?;
            }
        }

        Ok(AggregateResult::from_item(&self.store.get(id).await?))
    }
}

/// Deliver to one target: resolve, credential-check, then one bounded call.
async fn deliver_one(
    registry: Arc<BackendRegistry>,
    clock: Arc<dyn Clock>,
    request: DeliveryRequest,
    target: String,
    per_call: Duration,
    deadline: Instant,
) -> DeliveryOutcome {
    let Some(entry) = registry.resolve(&target) else {
        return DeliveryOutcome::failed(DeliveryError::unsupported(&target), clock.now());
    };
    if !entry.is_connected() {
        return DeliveryOutcome::failed(DeliveryError::not_connected(&target), clock.now());
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return DeliveryOutcome::skipped("dispatch deadline exhausted", clock.now());
    }

    let budget = remaining.min(per_call);
    let config = entry.config();
    match tokio::time::timeout(budget, entry.backend().deliver(request, &config)).await {
        Ok(Ok(delivered)) => DeliveryOutcome::delivered(delivered, clock.now()),
        Ok(Err(error)) => DeliveryOutcome::failed(error, clock.now()),
        Err(_) => DeliveryOutcome::failed(DeliveryError::timeout(budget), clock.now()),
    }
}
