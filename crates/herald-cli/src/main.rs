use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use herald_core::app::{AppBuilder, CadenceConfig, DispatchConfig, PollConfig};
use herald_core::domain::{Delivered, DeliveryError, NewItem};
use herald_core::impls::{
    InMemoryContentStore, InMemoryTopicPool, SessionBackend, TemplateGenerator, TracingNotifier,
};
use herald_core::ports::{
    BackendConfig, ContentStore, DeliveryBackend, DeliveryRequest, SystemClock, UlidGenerator,
};
use herald_core::registry::BackendRegistry;

/// Demo backend: fails the first `n` deliveries, then succeeds.
/// ポーリングループの「次の tick でリトライ」を見せるための仕込み。
struct FlakyFeed {
    remaining_failures: AtomicU32,
    counter: AtomicU32,
}

impl FlakyFeed {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
            counter: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DeliveryBackend for FlakyFeed {
    fn is_connected(&self, config: &BackendConfig) -> bool {
        config.api_key.is_some()
    }

    async fn deliver(
        &self,
        _request: DeliveryRequest,
        _config: &BackendConfig,
    ) -> Result<Delivered, DeliveryError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(DeliveryError::network(format!(
                "intentional failure (left={left})"
            )));
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Delivered::new(format!("feed-{n}")).with_url(format!("https://feed.example/{n}")))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,herald_core=debug".into()),
        )
        .init();

    // (A) ports の in-memory 実装を用意
    let clock = Arc::new(SystemClock);
    let ids = Arc::new(UlidGenerator::new(SystemClock));
    let store = Arc::new(InMemoryContentStore::new(ids.clone(), clock.clone()));
    let topics = Arc::new(InMemoryTopicPool::new(ids, clock.clone()));
    topics
        .seed(&["release notes", "behind the scenes", "roadmap"])
        .await
        .expect("seeding an in-memory pool cannot fail");

    // (B) 配信先を登録（statusfeed は最初の 1 回だけ失敗する）
    let mut registry = BackendRegistry::new();
    registry
        .register(
            "statusfeed",
            Arc::new(FlakyFeed::new(1)),
            BackendConfig::default().with_api_key("demo-key"),
        )
        .expect("fresh registry");
    registry
        .register(
            "journal",
            Arc::new(SessionBackend::new("app-password")),
            BackendConfig::default()
                .with_username("herald.example")
                .with_api_key("app-password"),
        )
        .expect("fresh registry");

    // (C) App を組み立てる（今日の曜日に statusfeed の自動投稿を仕込む)
    let cadence = CadenceConfig {
        window_start_hour: 0,
        window_end_hour: 23,
        period: Duration::from_secs(10),
        startup_delay: Duration::ZERO,
        pacing: Duration::from_secs(1),
        ..CadenceConfig::default()
    }
    .with_day(Utc::now().weekday(), vec!["statusfeed".to_string()]);

    let app = AppBuilder::new()
        .store(store.clone())
        .registry(registry)
        .clock(clock)
        .notifier(Arc::new(TracingNotifier))
        .dispatch_config(DispatchConfig::default())
        .poll_config(PollConfig {
            period: Duration::from_secs(2),
            ..PollConfig::default()
        })
        .cadence(topics, Arc::new(TemplateGenerator), cadence)
        .build()
        .expect("demo wiring is complete");

    // (D) 予約投稿 + 即時投稿を 1 件ずつ
    let scheduled_id = store
        .create(NewItem::scheduled(
            "Scheduled: the quarterly update",
            Utc::now(),
            vec!["statusfeed".into(), "journal".into()],
        ))
        .await
        .expect("valid item");
    println!("scheduled item: {scheduled_id}");

    let draft_id = store
        .create(NewItem::draft(
            "Right now: we shipped a thing",
            vec!["journal".into(), "megaphone".into()],
        ))
        .await
        .expect("valid item");
    let result = app.publish_now(draft_id).await.expect("dispatch runs");
    println!(
        "publish_now -> {}",
        serde_json::to_string_pretty(&result).expect("result serializes")
    );

    // (E) ループを回して予約分とリトライが流れるのを待つ
    let handles = app.start();
    tokio::time::sleep(Duration::from_secs(7)).await;
    handles.shutdown_and_join().await;

    for item in store.list(None, 10).await.expect("store is alive") {
        println!(
            "{} {:?} published_at={:?}",
            item.id, item.status, item.published_at
        );
        for target in &item.targets {
            println!(
                "  {} {:?} attempts={} error={:?}",
                target.target,
                target.status,
                target.attempts.len(),
                target.error
            );
        }
    }
}
