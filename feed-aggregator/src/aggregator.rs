use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common_metrics::{gauge, get_current_timestamp_seconds, histogram, inc, timing_guard};
use common_redis::Client;
use feed_common::document::{Decoded, LogDocument, ScoredDocument};
use feed_common::keys::{bucket, AGGREGATOR_GROUP, PROCESSED_LOG, STATS_BUCKET_FIELD, STATS_LOG};
use feed_common::stage::GroupConsumer;
use health::HealthHandle;
use tracing::{info, warn};

use crate::error::AggregatorError;
use crate::metrics_constants::*;
use crate::window::{Snapshot, Window};

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub consumer_name: String,
    pub window_secs: u64,
    pub read_count: usize,
    pub read_block: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Key of the snapshot written during this step, if a window closed with content.
    pub flushed: Option<String>,
    pub counted: usize,
}

/// Counts processed documents per topic and sentiment inside fixed windows, persisting each
/// window that saw at least one document once its end has passed.
pub struct Aggregator {
    client: Arc<dyn Client + Send + Sync>,
    consumer: GroupConsumer,
    window: Window,
    settings: AggregatorSettings,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Aggregator {
    pub async fn new(
        client: Arc<dyn Client + Send + Sync>,
        settings: AggregatorSettings,
        now: u64,
    ) -> Result<Self, AggregatorError> {
        if settings.window_secs == 0 {
            return Err(AggregatorError::InvalidConfiguration(
                "window length must be at least one second".to_string(),
            ));
        }

        let consumer = GroupConsumer::join(
            client.clone(),
            PROCESSED_LOG,
            AGGREGATOR_GROUP,
            &settings.consumer_name,
        )
        .await?;

        Ok(Self {
            client,
            consumer,
            window: Window::new(settings.window_secs, now),
            settings,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), AggregatorError> {
        info!(
            window_secs = self.settings.window_secs,
            window_start = self.window.start(),
            "aggregating {}", PROCESSED_LOG
        );
        loop {
            self.step(unix_now()).await?;
            liveness.report_healthy().await;
        }
    }

    /// Close the window if `now` is past its end, then count whatever is new.
    pub async fn step(&mut self, now: u64) -> Result<StepReport, AggregatorError> {
        let mut report = StepReport::default();

        let previous_start = self.window.start();
        match self.window.roll(now) {
            Some(snapshot) => report.flushed = Some(self.persist(&snapshot).await?),
            None if self.window.start() != previous_start => inc(EMPTY_WINDOWS, &[], 1),
            None => {}
        }

        let entries = self
            .consumer
            .read(self.settings.read_count, self.settings.read_block)
            .await?;
        if entries.is_empty() {
            return Ok(report);
        }

        let mut ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            ids.push(entry.id.clone());
            match ScoredDocument::from_entry(entry) {
                Decoded::Valid(doc) => {
                    self.window.record(doc.topic(), doc.sentiment);
                    report.counted += 1;
                }
                Decoded::Fallback(doc) => {
                    warn!(entry_id = %entry.id, "processed entry is not a document, counting it as neutral");
                    self.window.record(doc.topic(), doc.sentiment);
                    report.counted += 1;
                }
                Decoded::Empty => {}
            }
        }
        self.consumer.ack(ids).await?;

        inc(DOCUMENTS_IN, &[], report.counted as u64);
        gauge(WINDOW_DOCUMENTS, &[], self.window.documents() as f64);
        Ok(report)
    }

    /// Store the snapshot under its window key and announce the key on the stats log.
    async fn persist(&self, snapshot: &Snapshot) -> Result<String, AggregatorError> {
        let _timer = timing_guard(FLUSH_TIME, &[]);
        let key = bucket(snapshot.window_start);
        let body = serde_json::to_string(&snapshot.buckets)?;

        self.client
            .set_and_xadd(
                key.clone(),
                body,
                STATS_LOG.to_string(),
                vec![(STATS_BUCKET_FIELD.to_string(), key.clone())],
            )
            .await?;

        info!(
            key = %key,
            documents = snapshot.total(),
            "flushed window"
        );
        inc(SNAPSHOTS_OUT, &[], 1);
        histogram(SNAPSHOT_DOCUMENTS, &[], snapshot.total() as f64);
        gauge(LAST_FLUSH, &[], get_current_timestamp_seconds());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::MockRedisClient;

    #[tokio::test]
    async fn test_zero_window_is_rejected() {
        let result = Aggregator::new(
            Arc::new(MockRedisClient::new()),
            AggregatorSettings {
                consumer_name: "agg-test".to_string(),
                window_secs: 0,
                read_count: 10,
                read_block: Duration::from_millis(1),
            },
            0,
        )
        .await;
        assert!(matches!(
            result,
            Err(AggregatorError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01
        assert!(unix_now() > 1_577_836_800);
    }
}
