use std::sync::Arc;
use std::time::Duration;

use common_metrics::inc;
use common_redis::Client;
use feed_common::document::{LogDocument, RawDocument};
use feed_common::keys::RAW_LOG;
use governor::{
    clock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use health::HealthHandle;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::metrics_constants::DOCUMENTS_OUT;
use crate::source::DocumentSource;

/// Publishes articles from a source to the raw log at a steady pace, giving each one a
/// locally incrementing id.
pub struct Ingester {
    client: Arc<dyn Client + Send + Sync>,
    source: Box<dyn DocumentSource>,
    limiter: RateLimiter<NotKeyed, InMemoryState, clock::DefaultClock>,
    next_id: u64,
}

impl Ingester {
    pub fn new(
        client: Arc<dyn Client + Send + Sync>,
        source: Box<dyn DocumentSource>,
        per_second: f64,
        first_id: u64,
    ) -> Result<Self, IngestError> {
        if !(per_second.is_finite() && per_second > 0.0) {
            return Err(IngestError::InvalidConfiguration(format!(
                "ingest rate must be positive, got {per_second}"
            )));
        }
        let quota = Duration::try_from_secs_f64(1.0 / per_second)
            .ok()
            .and_then(Quota::with_period)
            .ok_or_else(|| {
                IngestError::InvalidConfiguration(format!("ingest rate {per_second} is out of range"))
            })?;

        Ok(Self {
            client,
            source,
            limiter: RateLimiter::direct(quota),
            next_id: first_id,
        })
    }

    /// Wait for the pacer, then publish until the source runs dry.
    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), IngestError> {
        info!(first_id = self.next_id, "publishing to {}", RAW_LOG);
        loop {
            self.limiter.until_ready().await;
            if self.step().await?.is_none() {
                info!(next_id = self.next_id, "source exhausted");
                return Ok(());
            }
            liveness.report_healthy().await;
        }
    }

    /// Publish the next article without pacing. Returns the entry id, `None` once exhausted.
    pub async fn step(&mut self) -> Result<Option<String>, IngestError> {
        let Some(article) = self.source.next_article() else {
            return Ok(None);
        };

        let doc = RawDocument::new(self.next_id.to_string(), article.title, article.body);
        let entry_id = self
            .client
            .xadd(RAW_LOG.to_string(), doc.to_fields()?)
            .await?;
        debug!(doc_id = %doc.id, entry_id = %entry_id, "published");

        self.next_id += 1;
        inc(DOCUMENTS_OUT, &[], 1);
        Ok(Some(entry_id))
    }
}
