//! IdGenerator port - ID 生成の抽象化
//!
//! # ULID の特性
//! - 時刻でソート可能
//! - 分散環境で生成可能（調整不要）
//!
//! The generator takes a [`Clock`] so tests with a pinned clock get IDs
//! whose timestamp component is deterministic.

use ulid::Ulid;

use crate::domain::{ItemId, TopicId};
use crate::ports::Clock;

/// Generates the strongly-typed IDs the stores hand out.
pub trait IdGenerator: Send + Sync {
    fn item_id(&self) -> ItemId;

    fn topic_id(&self) -> TopicId;
}

/// ULID-based generator: clock timestamp + random tail.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn item_id(&self) -> ItemId {
        ItemId::from_ulid(self.next())
    }

    fn topic_id(&self) -> TopicId {
        TopicId::from_ulid(self.next())
    }
}
