//! Impls - 実装（開発用・テスト用）
//!
//! ports の in-memory 実装を含みます。本番用実装（SQL ストア、実プロト
//! コルのバックエンド、AI 生成器）は別クレートに配置する前提です。

pub mod backends;
pub mod generator;
pub mod memory_store;
pub mod memory_topics;
pub mod notifier;

pub use self::backends::{RecordingBackend, SessionBackend};
pub use self::generator::TemplateGenerator;
pub use self::memory_store::InMemoryContentStore;
pub use self::memory_topics::InMemoryTopicPool;
pub use self::notifier::{NotificationEvent, RecordingNotifier, TracingNotifier};
