use std::sync::Arc;
use std::time::Duration;

use common_metrics::{gauge, inc, timing_guard};
use common_redis::{Client, CustomRedisError};
use feed_common::keys::{feed, LATEST_UID};
use health::HealthHandle;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::ReaderError;
use crate::metrics_constants::*;
use crate::rate::RatePolicy;

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub pop_timeout: Duration,
    pub population_refresh: Duration,
}

/// What one iteration of the reader did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nobody is subscribed yet.
    Idle,
    Popped { uid: u64, remaining: u64 },
    Empty { uid: u64, remaining: u64 },
}

/// Drains subscriber feeds at a rate that follows the subscriber population.
pub struct Reader {
    client: Arc<dyn Client + Send + Sync>,
    policy: RatePolicy,
    settings: ReaderSettings,
    rng: StdRng,
    population: u64,
    refreshed_at: Option<Instant>,
    backlog: u64,
}

impl Reader {
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        policy: RatePolicy,
        settings: ReaderSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            client,
            policy,
            settings,
            rng,
            population: 0,
            refreshed_at: None,
            backlog: 0,
        }
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    /// Running estimate of items waiting across all feeds.
    pub fn backlog(&self) -> u64 {
        self.backlog
    }

    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), ReaderError> {
        info!(min_rate = self.policy.min(), "draining subscriber feeds");
        loop {
            let (_, pause) = self.step().await?;
            liveness.report_healthy().await;
            tokio::time::sleep(pause).await;
        }
    }

    /// Pop once from a random feed. Returns what happened and how long to wait before the next step.
    pub async fn step(&mut self) -> Result<(Tick, Duration), ReaderError> {
        self.refresh_population().await?;

        if self.population == 0 {
            self.backlog = 0;
            gauge(FEED_BACKLOG, &[], 0.0);
            return Ok((Tick::Idle, self.policy.idle_interval()));
        }

        let uid = self.rng.gen_range(0..self.population);
        let key = feed(uid);

        let timer = timing_guard(POP_TIME, &[]);
        let item = self
            .client
            .brpop(key.clone(), self.settings.pop_timeout)
            .await?;
        timer.fin();

        let remaining = self.client.llen(key).await?;
        if item.is_some() {
            self.backlog = self.backlog.saturating_sub(1);
            inc(POPS, &[], 1);
        } else {
            inc(EMPTY_POPS, &[], 1);
        }
        self.backlog = self.backlog.saturating_add(remaining);

        let labels = [("uid".to_string(), uid.to_string())];
        gauge(FEED_LENGTH, &labels, remaining as f64);
        gauge(FEED_BACKLOG, &[], self.backlog as f64);

        let tick = match item {
            Some(_) => Tick::Popped { uid, remaining },
            None => Tick::Empty { uid, remaining },
        };
        Ok((tick, self.policy.interval(self.population)))
    }

    async fn refresh_population(&mut self) -> Result<(), ReaderError> {
        if self
            .refreshed_at
            .is_some_and(|at| at.elapsed() < self.settings.population_refresh)
        {
            return Ok(());
        }

        self.population = match self.client.get(LATEST_UID.to_string()).await {
            Ok(latest) => {
                // Uids start at 0, so the population is one past the latest
                let population = latest
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .and_then(|uid| uid.checked_add(1));
                match population {
                    Some(population) => population,
                    None => return Err(ReaderError::InvalidPopulation(latest)),
                }
            }
            Err(CustomRedisError::NotFound) => 0,
            Err(e) => return Err(e.into()),
        };
        self.refreshed_at = Some(Instant::now());

        let rate = self.policy.rate(self.population);
        debug!(population = self.population, rate, "recomputed read rate");
        gauge(POPULATION, &[], self.population as f64);
        gauge(TARGET_RATE, &[], rate);
        Ok(())
    }
}
