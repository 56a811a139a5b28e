//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。各 trait は外部システム
//! （ストレージ、配信先、生成器、通知）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ContentStore が source of truth（正本）
//! - 配信先のワイヤプロトコルは DeliveryBackend の向こう側
//! - 時刻と ID 生成も差し替え可能（テスト容易性）

pub mod backend;
pub mod clock;
pub mod content_store;
pub mod generator;
pub mod id_gen;
pub mod notifier;
pub mod topic_pool;

pub use self::backend::{BackendConfig, DeliveryBackend, DeliveryRequest};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::content_store::{ContentStore, StoreError};
pub use self::generator::{ContentGenerator, GenerateError, GeneratedContent};
pub use self::id_gen::{IdGenerator, UlidGenerator};
pub use self::notifier::{NotificationKind, NotificationSink};
pub use self::topic_pool::{Topic, TopicError, TopicPool};
