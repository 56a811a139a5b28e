//! Polling scheduler: discover due items and dispatch them.
//!
//! Stateless on purpose: everything it knows comes from the store query, so
//! a restart (or a second process) changes nothing. "Retry" is simply
//! "still due next tick".

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::app::dispatch::{DispatchEngine, DispatchError};
use crate::app::handle::LoopHandle;
use crate::domain::{AggregationPolicy, ItemStatus};
use crate::ports::{Clock, ContentStore};

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between ticks.
    pub period: std::time::Duration,

    /// How a tick folds target rows into an item status. AllOrNothing keeps
    /// partially-delivered items due, so stragglers get retried.
    pub policy: AggregationPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period: std::time::Duration::from_secs(60),
            policy: AggregationPolicy::AllOrNothing,
        }
    }
}

/// What one tick did, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub due: usize,
    pub published: usize,
    pub failed: usize,

    /// Dispatched but settled nothing; still due next tick.
    pub deferred: usize,

    /// Claimed by someone else while we held the batch.
    pub busy: usize,
}

/// The polling scheduler. Owns no state beyond its wiring; `tick()` is
/// public so tests can drive it with a pinned clock.
pub struct PollScheduler {
    store: Arc<dyn ContentStore>,
    engine: Arc<DispatchEngine>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl PollScheduler {
    pub fn new(
        store: Arc<dyn ContentStore>,
        engine: Arc<DispatchEngine>,
        clock: Arc<dyn Clock>,
        config: PollConfig,
    ) -> Self {
        Self {
            store,
            engine,
            clock,
            config,
        }
    }

    /// One pass over the due items. Errors stay inside the tick.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let due = match self.store.query_due(self.clock.now()).await {
            Ok(due) => due,
            Err(err) => {
                tracing::warn!(error = %err, "due-item query failed; will retry next tick");
                return summary;
            }
        };
        summary.due = due.len();

        for item in due {
            match self.engine.dispatch(item.id, self.config.policy).await {
                Ok(result) => match result.item_status {
                    ItemStatus::Published => summary.published += 1,
                    ItemStatus::Failed => summary.failed += 1,
                    _ => summary.deferred += 1,
                },
                // 他のディスパッチャが先に claim した（正常系）
                Err(DispatchError::Busy(_)) => summary.busy += 1,
                Err(err) => {
                    tracing::warn!(item = %item.id, error = %err, "dispatch failed mid-tick");
                }
            }
        }

        summary
    }

    /// Run the loop until shutdown is requested.
    pub fn spawn(self) -> LoopHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let summary = self.tick().await;
                if summary.due > 0 {
                    tracing::info!(
                        due = summary.due,
                        published = summary.published,
                        failed = summary.failed,
                        deferred = summary.deferred,
                        busy = summary.busy,
                        "poll tick"
                    );
                }

                // sleep は shutdown と競合させる
                tokio::select! {
                    _ = shutdown_rx.changed() => continue,
                    _ = tokio::time::sleep(self.config.period) => {}
                }
            }
            tracing::debug!("poll scheduler stopped");
        });

        LoopHandle::new(shutdown_tx, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dispatch::DispatchConfig;
    use crate::domain::{DeliveryError, NewItem};
    use crate::impls::backends::RecordingBackend;
    use crate::impls::memory_store::InMemoryContentStore;
    use crate::ports::{BackendConfig, FixedClock, SystemClock, UlidGenerator};
    use crate::registry::BackendRegistry;
    use chrono::{Duration, TimeZone, Utc};

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
        ))
    }

    fn wiring(
        clock: Arc<FixedClock>,
        registry: BackendRegistry,
    ) -> (Arc<InMemoryContentStore>, PollScheduler) {
        let store = Arc::new(InMemoryContentStore::new(
            Arc::new(UlidGenerator::new(SystemClock)),
            clock.clone(),
        ));
        let engine = Arc::new(DispatchEngine::new(
            store.clone(),
            Arc::new(registry),
            clock.clone(),
            DispatchConfig::default(),
        ));
        let scheduler = PollScheduler::new(
            store.clone(),
            engine,
            clock,
            PollConfig::default(),
        );
        (store, scheduler)
    }

    #[tokio::test]
    async fn due_item_with_clean_sweep_publishes() {
        let clock = fixed_clock();
        let mut registry = BackendRegistry::new();
        registry
            .register("x", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        registry
            .register("y", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        let (store, scheduler) = wiring(clock.clone(), registry);

        let id = store
            .create(NewItem::scheduled(
                "due",
                clock.now() - Duration::minutes(1),
                vec!["x".into(), "y".into()],
            ))
            .await
            .unwrap();

        let summary = scheduler.tick().await;
        assert_eq!(summary.due, 1);
        assert_eq!(summary.published, 1);
        assert_eq!(store.get(id).await.unwrap().status, ItemStatus::Published);
    }

    #[tokio::test]
    async fn all_failures_mark_the_item_failed() {
        let clock = fixed_clock();
        let mut registry = BackendRegistry::new();
        registry
            .register("z", Arc::new(RecordingBackend::disconnected()), BackendConfig::default())
            .unwrap();
        let (store, scheduler) = wiring(clock.clone(), registry);

        let id = store
            .create(NewItem::scheduled(
                "due",
                clock.now(),
                vec!["z".into()],
            ))
            .await
            .unwrap();

        let summary = scheduler.tick().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(store.get(id).await.unwrap().status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn mixed_results_stay_due_until_the_sweep_completes() {
        let clock = fixed_clock();
        let flaky = RecordingBackend::connected()
            .with_script(vec![Err(DeliveryError::network("flaky"))]);
        let mut registry = BackendRegistry::new();
        registry
            .register("x", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        registry
            .register("y", Arc::new(flaky), BackendConfig::default())
            .unwrap();
        let (store, scheduler) = wiring(clock.clone(), registry);

        let id = store
            .create(NewItem::scheduled(
                "due",
                clock.now(),
                vec!["x".into(), "y".into()],
            ))
            .await
            .unwrap();

        // tick 1: x lands, y fails, the item stays scheduled
        let summary = scheduler.tick().await;
        assert_eq!(summary.deferred, 1);
        assert_eq!(store.get(id).await.unwrap().status, ItemStatus::Scheduled);

        // tick 2: y's script ran dry, it succeeds, the sweep completes
        let summary = scheduler.tick().await;
        assert_eq!(summary.due, 1);
        assert_eq!(summary.published, 1);
        assert_eq!(store.get(id).await.unwrap().status, ItemStatus::Published);
    }

    #[tokio::test]
    async fn not_yet_due_items_are_untouched() {
        let clock = fixed_clock();
        let backend = Arc::new(RecordingBackend::connected());
        let mut registry = BackendRegistry::new();
        registry
            .register("x", Arc::clone(&backend) as Arc<dyn crate::ports::DeliveryBackend>, BackendConfig::default())
            .unwrap();
        let (store, scheduler) = wiring(clock.clone(), registry);

        store
            .create(NewItem::scheduled(
                "later",
                clock.now() + Duration::hours(1),
                vec!["x".into()],
            ))
            .await
            .unwrap();

        let summary = scheduler.tick().await;
        assert_eq!(summary, TickSummary::default());
        assert_eq!(backend.call_count(), 0);

        // time passes, the same loop picks it up
        clock.advance(Duration::hours(2));
        let summary = scheduler.tick().await;
        assert_eq!(summary.published, 1);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn spawned_loop_shuts_down_cleanly() {
        let clock = fixed_clock();
        let (_store, scheduler) = wiring(clock, BackendRegistry::new());

        let handle = scheduler.spawn();
        // let the first tick run
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.shutdown_and_join().await;
    }
}
