use std::sync::Arc;
use std::time::Duration;

use common_metrics::inc;
use common_redis::Client;
use feed_common::keys::{subscribers_index, user_profile, LATEST_UID, UID_SEQUENCE};
use feed_common::topic::Topic;
use governor::{
    clock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use health::HealthHandle;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SeederError;
use crate::metrics_constants::*;

pub const MIN_INTERESTS: usize = 2;
pub const MAX_INTERESTS: usize = 4;

/// What is stored at `user:<uid>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub uid: u64,
    pub interests: Vec<Topic>,
}

/// Registers synthetic subscribers with a few random interests each.
pub struct Seeder {
    client: Arc<dyn Client + Send + Sync>,
    rng: StdRng,
    limiter: RateLimiter<NotKeyed, InMemoryState, clock::DefaultClock>,
    limit: Option<u64>,
}

impl Seeder {
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        rng: StdRng,
        per_second: f64,
        limit: Option<u64>,
    ) -> Result<Self, SeederError> {
        let quota = (per_second.is_finite() && per_second > 0.0)
            .then(|| Duration::try_from_secs_f64(1.0 / per_second).ok())
            .flatten()
            .and_then(Quota::with_period)
            .ok_or_else(|| {
                SeederError::InvalidConfiguration(format!("seed rate {per_second} is out of range"))
            })?;

        Ok(Self {
            client,
            rng,
            limiter: RateLimiter::direct(quota),
            limit,
        })
    }

    /// Seed at the configured pace, until the optional limit is reached.
    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), SeederError> {
        info!(limit = ?self.limit, "seeding subscribers");
        let mut seeded = 0u64;
        loop {
            if self.limit.is_some_and(|limit| seeded >= limit) {
                info!(seeded, "seeding limit reached");
                return Ok(());
            }
            self.limiter.until_ready().await;
            let profile = self.step().await?;
            seeded += 1;
            if seeded % 100 == 0 {
                info!(seeded, latest_uid = profile.uid, "subscribers seeded");
            }
            liveness.report_healthy().await;
        }
    }

    /// Register one subscriber and publish it as the latest one.
    pub async fn step(&mut self) -> Result<Profile, SeederError> {
        let sequence = self.client.incr(UID_SEQUENCE.to_string()).await?;
        let uid = u64::try_from(sequence - 1).map_err(|_| SeederError::InvalidSequence(sequence))?;

        let count = self.rng.gen_range(MIN_INTERESTS..=MAX_INTERESTS);
        let interests: Vec<Topic> = Topic::ALL
            .choose_multiple(&mut self.rng, count)
            .copied()
            .collect();
        let profile = Profile { uid, interests };

        self.client
            .set(user_profile(uid), serde_json::to_string(&profile)?)
            .await?;
        for topic in &profile.interests {
            self.client
                .zadd(subscribers_index(*topic), uid.to_string(), 1.0)
                .await?;
        }
        // Last, so readers never pick an id whose profile is not written yet
        self.client
            .set(LATEST_UID.to_string(), uid.to_string())
            .await?;

        debug!(uid, interests = ?profile.interests, "seeded subscriber");
        inc(SUBSCRIBERS_SEEDED, &[], 1);
        inc(INTERESTS_SEEDED, &[], profile.interests.len() as u64);
        Ok(profile)
    }
}
