//! InMemoryTopicPool - 開発・テスト用のトピックプール

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{Clock, IdGenerator, Topic, TopicError, TopicPool};
use crate::domain::TopicId;

/// In-memory topic pool with round-robin selection.
pub struct InMemoryTopicPool {
    topics: Mutex<Vec<Topic>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTopicPool {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            topics: Mutex::new(Vec::new()),
            ids,
            clock,
        }
    }

    /// Seed the pool from a list of titles.
    pub async fn seed(&self, titles: &[&str]) -> Result<(), TopicError> {
        for title in titles {
            self.add(title).await?;
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<Topic> {
        self.topics.lock().await.clone()
    }
}

#[async_trait]
impl TopicPool for InMemoryTopicPool {
    async fn least_recently_used(&self) -> Result<Option<Topic>, TopicError> {
        let topics = self.topics.lock().await;
        // 使用回数の昇順、同数なら新しいものを先に
        Ok(topics
            .iter()
            .min_by_key(|t| (t.times_used, std::cmp::Reverse(t.created_at)))
            .cloned())
    }

    async fn mark_used(&self, id: TopicId) -> Result<(), TopicError> {
        let mut topics = self.topics.lock().await;
        let topic = topics
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TopicError::NotFound(id))?;
        topic.times_used += 1;
        topic.last_used = Some(self.clock.now());
        Ok(())
    }

    async fn add(&self, title: &str) -> Result<TopicId, TopicError> {
        let id = self.ids.topic_id();
        let topic = Topic {
            id,
            title: title.to_string(),
            times_used: 0,
            last_used: None,
            created_at: self.clock.now(),
        };
        self.topics.lock().await.push(topic);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock, UlidGenerator};
    use chrono::{Duration, TimeZone, Utc};

    fn pool_with_clock(clock: Arc<FixedClock>) -> InMemoryTopicPool {
        InMemoryTopicPool::new(Arc::new(UlidGenerator::new(SystemClock)), clock)
    }

    #[tokio::test]
    async fn empty_pool_selects_nothing() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
        ));
        let pool = pool_with_clock(clock);
        assert_eq!(pool.least_recently_used().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rotation_visits_use_counts_in_non_decreasing_order() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
        ));
        let pool = pool_with_clock(clock.clone());
        // 登録時刻をずらして recency を区別できるようにする
        for title in ["barrels", "mash bills", "tasting notes", "history"] {
            pool.add(title).await.unwrap();
            clock.advance(Duration::seconds(1));
        }

        let mut seen_counts = Vec::new();
        for _ in 0..8 {
            let topic = pool.least_recently_used().await.unwrap().unwrap();
            seen_counts.push(topic.times_used);
            pool.mark_used(topic.id).await.unwrap();
        }

        // 8 selections over 4 topics: two full rounds, counts never decrease
        assert_eq!(seen_counts, vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn ties_prefer_the_newest_topic() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
        ));
        let pool = pool_with_clock(clock.clone());

        pool.add("old").await.unwrap();
        clock.advance(Duration::minutes(1));
        pool.add("new").await.unwrap();

        let first = pool.least_recently_used().await.unwrap().unwrap();
        assert_eq!(first.title, "new");
    }

    #[tokio::test]
    async fn mark_used_stamps_the_clock() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(t0));
        let pool = pool_with_clock(clock.clone());

        let id = pool.add("barrels").await.unwrap();
        clock.advance(Duration::hours(2));
        pool.mark_used(id).await.unwrap();

        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot[0].times_used, 1);
        assert_eq!(snapshot[0].last_used, Some(t0 + Duration::hours(2)));
    }
}
