use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common_redis::{Client, CustomRedisError};
use feed_common::keys::subscribers_index;
use feed_common::topic::Topic;
use tokio::time::Instant;
use tracing::warn;

struct Cached {
    uids: Arc<[u64]>,
    fetched_at: Instant,
}

/// Subscriber ids per topic, refreshed from the subscriber index once their TTL runs out.
///
/// Subscribers registered in between are picked up on the next refresh, not before.
pub struct SubscriberCache {
    client: Arc<dyn Client + Send + Sync>,
    ttl: Duration,
    entries: HashMap<Topic, Cached>,
}

impl SubscriberCache {
    pub fn new(client: Arc<dyn Client + Send + Sync>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: HashMap::new(),
        }
    }

    pub async fn get(&mut self, topic: Topic) -> Result<Arc<[u64]>, CustomRedisError> {
        if let Some(cached) = self.entries.get(&topic) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.uids.clone());
            }
        }

        let members = self.client.zrange(subscribers_index(topic)).await?;
        let uids: Arc<[u64]> = members
            .iter()
            .filter_map(|member| match member.parse::<u64>() {
                Ok(uid) => Some(uid),
                Err(_) => {
                    warn!(topic = %topic, member = %member, "ignoring malformed subscriber id");
                    None
                }
            })
            .collect();

        self.entries.insert(
            topic,
            Cached {
                uids: uids.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(uids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::MockRedisClient;

    #[tokio::test]
    async fn test_cached_until_ttl() {
        let client = MockRedisClient::new();
        client
            .zadd(subscribers_index(Topic::Science), "1".into(), 1.0)
            .await
            .unwrap();
        let mut cache = SubscriberCache::new(Arc::new(client.clone()), Duration::from_secs(3600));

        assert_eq!(&*cache.get(Topic::Science).await.unwrap(), &[1]);

        client
            .zadd(subscribers_index(Topic::Science), "2".into(), 1.0)
            .await
            .unwrap();
        // Stale but accepted
        assert_eq!(&*cache.get(Topic::Science).await.unwrap(), &[1]);
        assert_eq!(client.calls_to("zrange").len(), 1);
    }

    #[tokio::test]
    async fn test_refreshed_after_ttl() {
        let client = MockRedisClient::new();
        let mut cache = SubscriberCache::new(Arc::new(client.clone()), Duration::ZERO);
        assert!(cache.get(Topic::Sports).await.unwrap().is_empty());

        client
            .zadd(subscribers_index(Topic::Sports), "7".into(), 1.0)
            .await
            .unwrap();
        assert_eq!(&*cache.get(Topic::Sports).await.unwrap(), &[7]);
    }

    #[tokio::test]
    async fn test_malformed_members_are_skipped() {
        let client = MockRedisClient::new();
        for member in ["3", "not-a-uid", "4"] {
            client
                .zadd(subscribers_index(Topic::Health), member.into(), 1.0)
                .await
                .unwrap();
        }
        let mut cache = SubscriberCache::new(Arc::new(client), Duration::ZERO);

        let mut uids = cache.get(Topic::Health).await.unwrap().to_vec();
        uids.sort();
        assert_eq!(uids, vec![3, 4]);
    }
}
