use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_redis::{Client, CustomRedisError, FeedPush};

/// Remembers which members were already seen within a scope, for a limited time.
#[async_trait]
pub trait SeenSet: Send + Sync {
    /// Record `member` in `scope`. Returns true only the first time within the TTL.
    async fn first_seen(&self, scope: &str, member: &str) -> Result<bool, CustomRedisError>;

    /// Record `member` in `scope` and push to the feed only if it was new, as one step.
    /// Returns the feed length after the push, `None` for a member already seen.
    async fn push_if_unseen(
        &self,
        scope: &str,
        member: &str,
        push: FeedPush,
    ) -> Result<Option<u64>, CustomRedisError>;
}

/// A seen-set stored as one expiring set per scope. The expiry is armed by the first insert
/// only, so a scope forgets everything at once when its TTL runs out.
pub struct RedisSeenSet {
    client: Arc<dyn Client + Send + Sync>,
    prefix: String,
    ttl: Duration,
}

impl RedisSeenSet {
    pub fn new(client: Arc<dyn Client + Send + Sync>, prefix: &str, ttl: Duration) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
            ttl,
        }
    }

    pub fn key(&self, scope: &str) -> String {
        format!("{}{}", self.prefix, scope)
    }

    // Sub-second TTLs would mean no expiry at all
    fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl SeenSet for RedisSeenSet {
    async fn first_seen(&self, scope: &str, member: &str) -> Result<bool, CustomRedisError> {
        self.client
            .sadd_expire_nx(self.key(scope), member.to_string(), self.ttl_seconds())
            .await
    }

    async fn push_if_unseen(
        &self,
        scope: &str,
        member: &str,
        push: FeedPush,
    ) -> Result<Option<u64>, CustomRedisError> {
        self.client
            .push_to_feed_once(self.key(scope), member.to_string(), self.ttl_seconds(), push)
            .await
    }
}
