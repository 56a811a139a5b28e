//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須の依存が揃っているかを build() 時にチェック
//! - cadence のスケジュールに載っている channel が registry に
//!   登録済みかもチェック（「期待集合 ⊆ 登録済み集合」）
//! - 不足があれば BuildError を返す

use std::sync::Arc;

use crate::app::cadence_loop::{CadenceConfig, CadenceScheduler};
use crate::app::dispatch::{AggregateResult, DispatchConfig, DispatchEngine, DispatchError};
use crate::app::handle::LoopHandle;
use crate::app::poll_loop::{PollConfig, PollScheduler};
use crate::domain::{AggregationPolicy, ItemId};
use crate::impls::notifier::TracingNotifier;
use crate::ports::{Clock, ContentGenerator, ContentStore, NotificationSink, SystemClock, TopicPool};
use crate::registry::BackendRegistry;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing dependency: {0}")]
    Missing(&'static str),

    #[error("cadence schedule names unregistered backends: {0:?}")]
    UnknownChannels(Vec<String>),
}

/// Builds an [`App`] from its ports and configuration.
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .store(store)
///     .registry(registry)
///     .cadence(topics, generator, cadence_config)
///     .build()?;
/// let handles = app.start();
/// ```
pub struct AppBuilder {
    store: Option<Arc<dyn ContentStore>>,
    registry: Option<Arc<BackendRegistry>>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    dispatch_config: DispatchConfig,
    poll_config: PollConfig,
    on_demand_policy: AggregationPolicy,
    cadence: Option<(Arc<dyn TopicPool>, Arc<dyn ContentGenerator>, CadenceConfig)>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            registry: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            dispatch_config: DispatchConfig::default(),
            poll_config: PollConfig::default(),
            on_demand_policy: AggregationPolicy::AnySuccess,
            cadence: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch_config = config;
        self
    }

    pub fn poll_config(mut self, config: PollConfig) -> Self {
        self.poll_config = config;
        self
    }

    /// Policy for `publish_now`. Defaults to AnySuccess; the polling loop
    /// keeps its own (stricter) policy from [`PollConfig`].
    pub fn on_demand_policy(mut self, policy: AggregationPolicy) -> Self {
        self.on_demand_policy = policy;
        self
    }

    /// Enable the autonomous cadence loop.
    pub fn cadence(
        mut self,
        topics: Arc<dyn TopicPool>,
        generator: Arc<dyn ContentGenerator>,
        config: CadenceConfig,
    ) -> Self {
        self.cadence = Some((topics, generator, config));
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        let store = self.store.ok_or(BuildError::Missing("content store"))?;
        let registry = self.registry.ok_or(BuildError::Missing("backend registry"))?;

        if let Some((_, _, config)) = &self.cadence {
            let mut unknown: Vec<String> = config
                .schedule
                .values()
                .flatten()
                .filter(|channel| !registry.contains(channel))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                unknown.sort();
                unknown.dedup();
                return Err(BuildError::UnknownChannels(unknown));
            }
        }

        let engine = Arc::new(DispatchEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&self.clock),
            self.dispatch_config,
        ));

        Ok(App {
            store,
            engine,
            clock: self.clock,
            notifier: self.notifier,
            poll_config: self.poll_config,
            on_demand_policy: self.on_demand_policy,
            cadence: self.cadence,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown handles for the spawned background loops.
pub struct AppHandles {
    pub poll: LoopHandle,
    pub cadence: Option<LoopHandle>,
}

impl AppHandles {
    pub async fn shutdown_and_join(self) {
        self.poll.shutdown_and_join().await;
        if let Some(cadence) = self.cadence {
            cadence.shutdown_and_join().await;
        }
    }
}

/// The wired application: on-demand publishing plus the background loops.
pub struct App {
    store: Arc<dyn ContentStore>,
    engine: Arc<DispatchEngine>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    poll_config: PollConfig,
    on_demand_policy: AggregationPolicy,
    cadence: Option<(Arc<dyn TopicPool>, Arc<dyn ContentGenerator>, CadenceConfig)>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("poll_config", &self.poll_config)
            .field("on_demand_policy", &self.on_demand_policy)
            .field("has_cadence", &self.cadence.is_some())
            .finish_non_exhaustive()
    }
}

impl App {
    /// The on-demand path: dispatch an item right now and report per-target
    /// results to the caller.
    pub async fn publish_now(&self, id: ItemId) -> Result<AggregateResult, DispatchError> {
        self.engine.dispatch(id, self.on_demand_policy).await
    }

    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Spawn the polling loop (and the cadence loop when configured).
    pub fn start(&self) -> AppHandles {
        let poll = PollScheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
            self.poll_config.clone(),
        )
        .spawn();

        let cadence = self
            .cadence
            .as_ref()
            .map(|(topics, generator, config)| {
                CadenceScheduler::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.engine),
                    Arc::clone(topics),
                    Arc::clone(generator),
                    Arc::clone(&self.notifier),
                    Arc::clone(&self.clock),
                    config.clone(),
                )
                .spawn()
            });

        AppHandles { poll, cadence }
    }
}
