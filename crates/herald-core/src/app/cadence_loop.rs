//! Autonomous cadence scheduler: generate and deliver on a weekly rhythm.
//!
//! Runs on a coarse period inside a business-hours window, picks the least
//! used topic, generates content per channel, and delivers it. At most one
//! run per calendar day: generation and posting both cost real money, so
//! frequent ticks and process restarts must not multiply them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Timelike, Weekday};
use tokio::sync::watch;

use crate::app::dispatch::DispatchEngine;
use crate::app::handle::LoopHandle;
use crate::domain::NewItem;
use crate::ports::{
    Clock, ContentGenerator, ContentStore, NotificationKind, NotificationSink, TopicPool,
};

#[derive(Debug, Clone)]
pub struct CadenceConfig {
    /// Which channels fire on which weekday. Missing/empty days are off.
    pub schedule: HashMap<Weekday, Vec<String>>,

    /// Operating window, hours of day in UTC, inclusive on both ends.
    pub window_start_hour: u32,
    pub window_end_hour: u32,

    /// Sleep between ticks.
    pub period: Duration,

    /// Delay before the first tick, so a boot doesn't stampede.
    pub startup_delay: Duration,

    /// Pause between channels within one run (backend rate limits).
    pub pacing: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            schedule: HashMap::new(),
            window_start_hour: 9,
            window_end_hour: 17,
            period: Duration::from_secs(2 * 60 * 60),
            startup_delay: Duration::from_secs(5 * 60),
            pacing: Duration::from_secs(30),
        }
    }
}

impl CadenceConfig {
    pub fn with_day(mut self, day: Weekday, channels: Vec<String>) -> Self {
        self.schedule.insert(day, channels);
        self
    }

    fn channels_for(&self, day: Weekday) -> &[String] {
        self.schedule.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    fn in_window(&self, hour: u32) -> bool {
        hour >= self.window_start_hour && hour <= self.window_end_hour
    }
}

/// What one tick decided, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadenceTick {
    /// Current hour is outside the operating window.
    OutsideWindow,

    /// Today's channel list is empty.
    NothingScheduled,

    /// Today already ran (cursor or store backstop).
    AlreadyHandled,

    /// The store was unreachable; nothing marked, next tick retries.
    Deferred,

    /// Topic pool is empty; the day is marked handled so we don't hot-loop.
    NoTopics,

    Ran { attempted: usize, published: usize },
}

/// The autonomous scheduler. `tick()` is public and clock-driven so tests
/// walk it through days deterministically.
pub struct CadenceScheduler {
    store: Arc<dyn ContentStore>,
    engine: Arc<DispatchEngine>,
    topics: Arc<dyn TopicPool>,
    generator: Arc<dyn ContentGenerator>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: CadenceConfig,

    /// Last calendar day this scheduler ran. The in-process dedup cursor;
    /// the created-today store query backstops it across restarts.
    last_run: Mutex<Option<NaiveDate>>,
}

impl CadenceScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ContentStore>,
        engine: Arc<DispatchEngine>,
        topics: Arc<dyn TopicPool>,
        generator: Arc<dyn ContentGenerator>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: CadenceConfig,
    ) -> Self {
        Self {
            store,
            engine,
            topics,
            generator,
            notifier,
            clock,
            config,
            last_run: Mutex::new(None),
        }
    }

    fn mark_handled(&self, day: NaiveDate) {
        *self.last_run.lock().expect("cursor lock poisoned") = Some(day);
    }

    fn already_handled(&self, day: NaiveDate) -> bool {
        *self.last_run.lock().expect("cursor lock poisoned") == Some(day)
    }

    /// One cadence decision. Everything costly happens only after the
    /// same-day dedup gate.
    pub async fn tick(&self) -> CadenceTick {
        let now = self.clock.now();
        if !self.config.in_window(now.hour()) {
            return CadenceTick::OutsideWindow;
        }
        let channels = self.config.channels_for(now.weekday()).to_vec();
        if channels.is_empty() {
            return CadenceTick::NothingScheduled;
        }

        let today = now.date_naive();
        if self.already_handled(today) {
            return CadenceTick::AlreadyHandled;
        }
        // 再起動をまたいだ重複防止（ストア側のバックストップ）
        match self.store.query_created_on(today).await {
            Ok(items) if !items.is_empty() => {
                self.mark_handled(today);
                return CadenceTick::AlreadyHandled;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "created-today query failed; deferring cadence run");
                return CadenceTick::Deferred;
            }
        }

        let topic = match self.topics.least_recently_used().await {
            Ok(Some(topic)) => topic,
            Ok(None) => {
                self.mark_handled(today);
                self.notifier
                    .notify(
                        NotificationKind::Error,
                        "Autopost skipped",
                        "topic pool is empty; add topics to resume the cadence",
                        "",
                    )
                    .await;
                return CadenceTick::NoTopics;
            }
            Err(err) => {
                tracing::warn!(error = %err, "topic selection failed; deferring cadence run");
                return CadenceTick::Deferred;
            }
        };
        if let Err(err) = self.topics.mark_used(topic.id).await {
            // rotation bookkeeping failed; the run itself still proceeds
            tracing::warn!(topic = %topic.id, error = %err, "failed to mark topic used");
        }

        // ここから先は当日分を消費済みにする（失敗してもリトライしない）
        self.mark_handled(today);

        let mut published = 0;
        for (index, channel) in channels.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.pacing).await;
            }
            if self.run_channel(channel, &topic).await {
                published += 1;
            }
        }

        CadenceTick::Ran {
            attempted: channels.len(),
            published,
        }
    }

    /// Generate + deliver for one channel. Returns whether it published.
    async fn run_channel(&self, channel: &str, topic: &crate::ports::Topic) -> bool {
        let content = match self.generator.generate(topic, channel).await {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(channel, error = %err, "autopost generation failed");
                self.notifier
                    .notify(
                        NotificationKind::Error,
                        "Autopost generation failed",
                        &format!("{channel}: {err}"),
                        "",
                    )
                    .await;
                return false;
            }
        };

        let mut new_item = NewItem::draft(content.body, vec![channel.to_string()]);
        if let Some(media_ref) = content.media_ref {
            new_item = new_item.with_media(media_ref);
        }
        let id = match self.store.create(new_item).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(channel, error = %err, "autopost item creation failed");
                return false;
            }
        };

        match self.engine.dispatch_single(id, channel).await {
            Ok(result) if result.any_success => {
                let link = result
                    .per_target
                    .first()
                    .and_then(|r| r.url.clone())
                    .unwrap_or_default();
                tracing::info!(channel, item = %id, "autopost published");
                self.notifier
                    .notify(
                        NotificationKind::Success,
                        "Autopost published",
                        &format!("{channel}: {}", topic.title),
                        &link,
                    )
                    .await;
                true
            }
            Ok(result) => {
                // item stays a draft for the operator to pick up
                let reason = result
                    .per_target
                    .first()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "delivery failed".to_string());
                tracing::warn!(channel, item = %id, reason, "autopost left in drafts");
                self.notifier
                    .notify(
                        NotificationKind::Error,
                        "Autopost left in drafts",
                        &format!("{channel}: {reason}"),
                        "",
                    )
                    .await;
                false
            }
            Err(err) => {
                tracing::warn!(channel, item = %id, error = %err, "autopost dispatch failed");
                self.notifier
                    .notify(
                        NotificationKind::Error,
                        "Autopost dispatch failed",
                        &format!("{channel}: {err}"),
                        "",
                    )
                    .await;
                false
            }
        }
    }

    /// Run the loop until shutdown is requested.
    pub fn spawn(self) -> LoopHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            // 起動直後のスタンピード回避
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(self.config.startup_delay) => {}
            }

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let outcome = self.tick().await;
                tracing::debug!(?outcome, "cadence tick");

                tokio::select! {
                    _ = shutdown_rx.changed() => continue,
                    _ = tokio::time::sleep(self.config.period) => {}
                }
            }
            tracing::debug!("cadence scheduler stopped");
        });

        LoopHandle::new(shutdown_tx, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dispatch::DispatchConfig;
    use crate::domain::ItemStatus;
    use crate::impls::backends::RecordingBackend;
    use crate::impls::generator::TemplateGenerator;
    use crate::impls::memory_store::InMemoryContentStore;
    use crate::impls::memory_topics::InMemoryTopicPool;
    use crate::impls::notifier::RecordingNotifier;
    use crate::ports::{
        BackendConfig, FixedClock, GenerateError, GeneratedContent, SystemClock, Topic,
        UlidGenerator,
    };
    use crate::registry::BackendRegistry;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    /// Monday 2025-06-02, 10:00 UTC: inside the default window.
    fn monday_morning() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
    }

    struct FailingGenerator;

    #[async_trait]
    impl ContentGenerator for FailingGenerator {
        async fn generate(
            &self,
            _topic: &Topic,
            _channel: &str,
        ) -> Result<GeneratedContent, GenerateError> {
            Err(GenerateError::MissingCredentials)
        }
    }

    struct Wiring {
        store: Arc<InMemoryContentStore>,
        topics: Arc<InMemoryTopicPool>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<FixedClock>,
    }

    fn cadence_config() -> CadenceConfig {
        let mut config = CadenceConfig::default();
        config.pacing = Duration::ZERO;
        config.with_day(Weekday::Mon, vec!["statusfeed".to_string()])
    }

    fn scheduler_with(
        registry: BackendRegistry,
        generator: Arc<dyn ContentGenerator>,
        config: CadenceConfig,
    ) -> (CadenceScheduler, Wiring) {
        let clock = Arc::new(FixedClock::new(monday_morning()));
        let ids = Arc::new(UlidGenerator::new(SystemClock));
        let store = Arc::new(InMemoryContentStore::new(ids.clone(), clock.clone()));
        let topics = Arc::new(InMemoryTopicPool::new(ids, clock.clone()));
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = Arc::new(DispatchEngine::new(
            store.clone(),
            Arc::new(registry),
            clock.clone(),
            DispatchConfig::default(),
        ));
        let scheduler = CadenceScheduler::new(
            store.clone(),
            engine,
            topics.clone(),
            generator,
            notifier.clone(),
            clock.clone(),
            config,
        );
        (
            scheduler,
            Wiring {
                store,
                topics,
                notifier,
                clock,
            },
        )
    }

    #[tokio::test]
    async fn runs_once_per_day_no_matter_how_many_ticks() {
        let mut registry = BackendRegistry::new();
        registry
            .register("statusfeed", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        let (scheduler, wiring) =
            scheduler_with(registry, Arc::new(TemplateGenerator), cadence_config());
        wiring.topics.seed(&["barrels", "history"]).await.unwrap();

        let first = scheduler.tick().await;
        assert_eq!(
            first,
            CadenceTick::Ran {
                attempted: 1,
                published: 1
            }
        );

        // 同じ日の 2 回目以降は何もしない
        wiring.clock.advance(chrono::Duration::hours(2));
        assert_eq!(scheduler.tick().await, CadenceTick::AlreadyHandled);

        let today = monday_morning().date_naive();
        let created = wiring.store.query_created_on(today).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, ItemStatus::Published);
    }

    #[tokio::test]
    async fn outside_window_and_off_days_do_nothing() {
        let (scheduler, wiring) = scheduler_with(
            BackendRegistry::new(),
            Arc::new(TemplateGenerator),
            cadence_config(),
        );
        wiring.topics.seed(&["barrels"]).await.unwrap();

        // 06:00 is before the window opens
        wiring
            .clock
            .set(Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap());
        assert_eq!(scheduler.tick().await, CadenceTick::OutsideWindow);

        // Saturday has no channels configured
        wiring
            .clock
            .set(Utc.with_ymd_and_hms(2025, 6, 7, 10, 0, 0).unwrap());
        assert_eq!(scheduler.tick().await, CadenceTick::NothingScheduled);

        assert!(wiring.store.list(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_backstop_survives_a_restart() {
        let mut registry = BackendRegistry::new();
        registry
            .register("statusfeed", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        let (scheduler, wiring) =
            scheduler_with(registry, Arc::new(TemplateGenerator), cadence_config());
        wiring.topics.seed(&["barrels"]).await.unwrap();

        assert!(matches!(scheduler.tick().await, CadenceTick::Ran { .. }));

        // "restart": a fresh scheduler with an empty cursor over the same store
        let mut registry = BackendRegistry::new();
        registry
            .register("statusfeed", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        let engine = Arc::new(DispatchEngine::new(
            wiring.store.clone(),
            Arc::new(registry),
            wiring.clock.clone(),
            DispatchConfig::default(),
        ));
        let restarted = CadenceScheduler::new(
            wiring.store.clone(),
            engine,
            wiring.topics.clone(),
            Arc::new(TemplateGenerator),
            wiring.notifier.clone(),
            wiring.clock.clone(),
            cadence_config(),
        );

        assert_eq!(restarted.tick().await, CadenceTick::AlreadyHandled);
        let created = wiring
            .store
            .query_created_on(monday_morning().date_naive())
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn generation_failure_notifies_and_consumes_the_day() {
        let (scheduler, wiring) = scheduler_with(
            BackendRegistry::new(),
            Arc::new(FailingGenerator),
            cadence_config(),
        );
        wiring.topics.seed(&["barrels"]).await.unwrap();

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            CadenceTick::Ran {
                attempted: 1,
                published: 0
            }
        );

        // no item, one operator notification, and no retry today
        assert!(wiring.store.list(None, 10).await.unwrap().is_empty());
        let events = wiring.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NotificationKind::Error);
        assert!(events[0].message.contains("statusfeed"));

        assert_eq!(scheduler.tick().await, CadenceTick::AlreadyHandled);
    }

    #[tokio::test]
    async fn delivery_failure_leaves_a_draft_and_notifies() {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                "statusfeed",
                Arc::new(RecordingBackend::disconnected()),
                BackendConfig::default(),
            )
            .unwrap();
        let (scheduler, wiring) =
            scheduler_with(registry, Arc::new(TemplateGenerator), cadence_config());
        wiring.topics.seed(&["barrels"]).await.unwrap();

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            CadenceTick::Ran {
                attempted: 1,
                published: 0
            }
        );

        let drafts = wiring
            .store
            .list(Some(ItemStatus::Draft), 10)
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);

        let events = wiring.notifier.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("statusfeed is not connected"));
    }

    #[tokio::test]
    async fn empty_topic_pool_marks_the_day_and_notifies() {
        let (scheduler, wiring) = scheduler_with(
            BackendRegistry::new(),
            Arc::new(TemplateGenerator),
            cadence_config(),
        );

        assert_eq!(scheduler.tick().await, CadenceTick::NoTopics);
        assert_eq!(scheduler.tick().await, CadenceTick::AlreadyHandled);
        assert_eq!(wiring.notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn the_next_day_rotates_to_a_fresh_topic() {
        let mut registry = BackendRegistry::new();
        registry
            .register("statusfeed", Arc::new(RecordingBackend::connected()), BackendConfig::default())
            .unwrap();
        let config = cadence_config().with_day(Weekday::Tue, vec!["statusfeed".to_string()]);
        let (scheduler, wiring) =
            scheduler_with(registry, Arc::new(TemplateGenerator), config);
        wiring.topics.seed(&["barrels", "history"]).await.unwrap();

        assert!(matches!(scheduler.tick().await, CadenceTick::Ran { .. }));
        wiring.clock.advance(chrono::Duration::days(1));
        assert!(matches!(scheduler.tick().await, CadenceTick::Ran { .. }));

        // both topics used exactly once after two days
        let counts: Vec<u32> = wiring
            .topics
            .snapshot()
            .await
            .iter()
            .map(|t| t.times_used)
            .collect();
        assert_eq!(counts, vec![1, 1]);

        let items = wiring.store.list(None, 10).await.unwrap();
        assert_eq!(items.len(), 2);
        // 二日分の本文は別トピック由来
        assert_ne!(items[0].body, items[1].body);
    }
}
