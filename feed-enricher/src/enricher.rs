use std::sync::Arc;
use std::time::Duration;

use common_metrics::{gauge, inc, timing_guard};
use common_redis::{Client, LogAppend, RetryPolicy, StreamEntry};
use feed_common::document::{Decoded, LogDocument, RawDocument, TopicDocument};
use feed_common::keys::{topic_log, ENRICHED_LOG, ENRICH_GROUP, RAW_LOG};
use feed_common::scorer::{score_with_retry, Scorer};
use feed_common::stage::GroupConsumer;
use feed_common::topic::Topic;
use health::HealthHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::EnricherError;
use crate::metrics_constants::*;

#[derive(Debug, Clone)]
pub struct EnricherSettings {
    pub consumer_name: String,
    pub batch_size: usize,
    pub read_block: Duration,
    pub batch_max_wait: Duration,
    pub raw_max_len: usize,
    pub topic_max_len: usize,
    pub enriched_max_len: usize,
    pub scorer_max_attempts: u32,
}

/// What one pass over a scored batch did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub consumed: usize,
    pub published: usize,
    pub skipped: bool,
}

/// Classifies raw documents by topic, one scorer call per batch, and routes each one to its
/// topic log and to the enriched log.
pub struct Enricher {
    client: Arc<dyn Client + Send + Sync>,
    consumer: GroupConsumer,
    scorer: Arc<dyn Scorer<RawDocument, Topic>>,
    retry_policy: RetryPolicy,
    settings: EnricherSettings,
    buffer: Vec<StreamEntry>,
    buffered_since: Option<Instant>,
}

impl Enricher {
    pub async fn new(
        client: Arc<dyn Client + Send + Sync>,
        scorer: Arc<dyn Scorer<RawDocument, Topic>>,
        retry_policy: RetryPolicy,
        settings: EnricherSettings,
    ) -> Result<Self, EnricherError> {
        if settings.batch_size == 0 {
            return Err(EnricherError::InvalidConfiguration(
                "batch size must be at least 1".to_string(),
            ));
        }
        if settings.scorer_max_attempts == 0 {
            return Err(EnricherError::InvalidConfiguration(
                "scorer max attempts must be at least 1".to_string(),
            ));
        }

        let consumer = GroupConsumer::join(
            client.clone(),
            RAW_LOG,
            ENRICH_GROUP,
            &settings.consumer_name,
        )
        .await?;

        Ok(Self {
            client,
            consumer,
            scorer,
            retry_policy,
            buffer: Vec::with_capacity(settings.batch_size),
            buffered_since: None,
            settings,
        })
    }

    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), EnricherError> {
        info!(
            batch_size = self.settings.batch_size,
            "enricher consuming {}", RAW_LOG
        );
        loop {
            self.step().await?;
            liveness.report_healthy().await;
        }
    }

    /// Read once, then score a batch if one is ready. Returns `None` while buffering.
    pub async fn step(&mut self) -> Result<Option<BatchReport>, EnricherError> {
        let wanted = self.settings.batch_size - self.buffer.len();
        let entries = self.consumer.read(wanted, self.settings.read_block).await?;
        if !entries.is_empty() && self.buffered_since.is_none() {
            self.buffered_since = Some(Instant::now());
        }
        self.buffer.extend(entries);

        if !self.batch_ready() {
            return Ok(None);
        }

        let batch: Vec<StreamEntry> = self.buffer.drain(..).collect();
        self.buffered_since = None;
        self.process_batch(batch).await.map(Some)
    }

    fn batch_ready(&self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        // Recovered entries go out before any new read joins them
        self.consumer.is_replaying()
            || self.buffer.len() >= self.settings.batch_size
            || self
                .buffered_since
                .is_some_and(|since| since.elapsed() >= self.settings.batch_max_wait)
    }

    async fn process_batch(
        &mut self,
        entries: Vec<StreamEntry>,
    ) -> Result<BatchReport, EnricherError> {
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let mut docs = Vec::with_capacity(entries.len());
        for entry in &entries {
            match RawDocument::from_entry(entry) {
                Decoded::Valid(doc) => docs.push(doc),
                Decoded::Fallback(doc) => {
                    warn!(entry_id = %entry.id, "raw entry is not a document, using its text");
                    inc(FALLBACK_DOCUMENTS, &[], 1);
                    docs.push(doc);
                }
                Decoded::Empty => {
                    debug!(entry_id = %entry.id, "raw entry has no fields, skipping");
                    inc(EMPTY_ENTRIES, &[], 1);
                }
            }
        }
        inc(DOCUMENTS_IN, &[], entries.len() as u64);

        let mut report = BatchReport {
            consumed: entries.len(),
            ..Default::default()
        };

        if !docs.is_empty() {
            let timer = timing_guard(SCORER_TIME, &[]);
            let scored = score_with_retry(
                self.scorer.as_ref(),
                &docs,
                &self.retry_policy,
                self.settings.scorer_max_attempts,
            )
            .await;
            timer.fin();

            match scored {
                Ok(topics) => {
                    report.published = self.publish(docs, topics).await?;
                }
                Err(err) => {
                    error!(
                        error = %err,
                        documents = docs.len(),
                        "scorer kept failing, skipping batch"
                    );
                    inc(BATCHES_SKIPPED, &[], 1);
                    report.skipped = true;
                }
            }
        }

        self.consumer.ack(ids).await?;

        let trimmed = self
            .client
            .xtrim(RAW_LOG.to_string(), self.settings.raw_max_len)
            .await?;
        inc(RAW_TRIM_OPS, &[], 1);
        inc(RAW_TRIMMED_ENTRIES, &[], trimmed);

        let length = self.client.xlen(RAW_LOG.to_string()).await?;
        gauge(RAW_LOG_LENGTH, &[], length as f64);

        Ok(report)
    }

    /// Publish every document to its topic log and to the enriched log, in one transaction.
    async fn publish(
        &self,
        docs: Vec<RawDocument>,
        topics: Vec<Topic>,
    ) -> Result<usize, EnricherError> {
        let mut appends = Vec::with_capacity(docs.len() * 2);
        for (mut raw, topic) in docs.into_iter().zip(topics) {
            if raw.tags.is_empty() {
                raw.tags.push(topic.to_string());
            }
            let fields = TopicDocument::new(raw, topic).to_fields()?;
            appends.push(
                LogAppend::new(topic_log(topic), fields.clone()).capped(self.settings.topic_max_len),
            );
            appends.push(
                LogAppend::new(ENRICHED_LOG, fields).capped(self.settings.enriched_max_len),
            );
        }

        let published = appends.len() / 2;
        self.client.publish_batch(appends).await?;
        inc(DOCUMENTS_OUT, &[], published as u64);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common_redis::MockRedisClient;
    use feed_common::scorer::{KeywordClassifier, ScorerError};

    struct FailingScorer;

    #[async_trait]
    impl Scorer<RawDocument, Topic> for FailingScorer {
        async fn score(&self, _batch: &[RawDocument]) -> Result<Vec<Topic>, ScorerError> {
            Err(ScorerError::Status(500))
        }
    }

    fn settings(batch_size: usize) -> EnricherSettings {
        EnricherSettings {
            consumer_name: "enrich-test".to_string(),
            batch_size,
            read_block: Duration::from_millis(1),
            batch_max_wait: Duration::from_secs(3600),
            raw_max_len: 100,
            topic_max_len: 100,
            enriched_max_len: 100,
            scorer_max_attempts: 2,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::build(1, Duration::from_millis(1)).provide()
    }

    async fn add_raw(client: &MockRedisClient, id: &str, title: &str) {
        let fields = RawDocument::new(id, title, "").to_fields().unwrap();
        client.xadd(RAW_LOG.to_string(), fields).await.unwrap();
    }

    async fn enricher(
        client: &MockRedisClient,
        scorer: Arc<dyn Scorer<RawDocument, Topic>>,
        batch_size: usize,
    ) -> Enricher {
        Enricher::new(
            Arc::new(client.clone()),
            scorer,
            fast_retry(),
            settings(batch_size),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_partial_batch_is_buffered_without_ack() {
        let client = MockRedisClient::new();
        let mut enricher = enricher(&client, Arc::new(KeywordClassifier), 3).await;

        add_raw(&client, "1", "Election results").await;
        add_raw(&client, "2", "Cup final").await;

        assert_eq!(enricher.step().await.unwrap(), None);
        assert_eq!(client.pending_count(RAW_LOG, ENRICH_GROUP), 2);
        assert_eq!(client.log_len(ENRICHED_LOG), 0);

        add_raw(&client, "3", "New vaccine").await;
        let report = enricher.step().await.unwrap().unwrap();

        assert_eq!(report.consumed, 3);
        assert_eq!(report.published, 3);
        assert_eq!(client.pending_count(RAW_LOG, ENRICH_GROUP), 0);
        assert_eq!(client.log_len(ENRICHED_LOG), 3);
    }

    #[tokio::test]
    async fn test_lost_read_reply_publishes_each_document_once() {
        let client = MockRedisClient::new();
        let mut enricher = enricher(&client, Arc::new(KeywordClassifier), 3).await;

        add_raw(&client, "1", "Election results").await;
        assert_eq!(enricher.step().await.unwrap(), None);

        add_raw(&client, "2", "Cup final").await;
        client.lose_reply_next("xreadgroup", common_redis::CustomRedisError::Timeout);
        let buffered = enricher.step().await.unwrap().unwrap();
        assert_eq!(buffered.published, 1);

        let recovered = enricher.step().await.unwrap().unwrap();
        assert_eq!(recovered.published, 1);
        assert_eq!(client.log_len(ENRICHED_LOG), 2);
        assert_eq!(client.pending_count(RAW_LOG, ENRICH_GROUP), 0);
    }

    #[tokio::test]
    async fn test_stale_partial_batch_is_flushed() {
        let client = MockRedisClient::new();
        let mut settings = settings(10);
        settings.batch_max_wait = Duration::ZERO;
        let mut enricher = Enricher::new(
            Arc::new(client.clone()),
            Arc::new(KeywordClassifier),
            fast_retry(),
            settings,
        )
        .await
        .unwrap();

        add_raw(&client, "1", "Telescope images").await;
        let report = enricher.step().await.unwrap().unwrap();
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn test_failing_scorer_skips_and_acks_batch() {
        let client = MockRedisClient::new();
        let mut enricher = enricher(&client, Arc::new(FailingScorer), 2).await;

        add_raw(&client, "1", "a").await;
        add_raw(&client, "2", "b").await;
        let report = enricher.step().await.unwrap().unwrap();

        assert!(report.skipped);
        assert_eq!(report.published, 0);
        assert_eq!(client.pending_count(RAW_LOG, ENRICH_GROUP), 0);
        assert!(client.calls_to("publish_batch").is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_batch_pending() {
        let client = MockRedisClient::new().fail_next(
            "publish_batch",
            common_redis::CustomRedisError::ParseError("boom".to_string()),
        );
        let mut enricher = enricher(&client, Arc::new(KeywordClassifier), 1).await;

        add_raw(&client, "1", "Budget vote").await;
        assert!(enricher.step().await.is_err());
        assert_eq!(client.pending_count(RAW_LOG, ENRICH_GROUP), 1);
        assert!(client.calls_to("xack").is_empty());
    }

    #[tokio::test]
    async fn test_raw_log_is_trimmed_after_ack() {
        let client = MockRedisClient::new();
        let mut settings = settings(5);
        settings.raw_max_len = 2;
        let mut enricher = Enricher::new(
            Arc::new(client.clone()),
            Arc::new(KeywordClassifier),
            fast_retry(),
            settings,
        )
        .await
        .unwrap();

        for i in 0..5 {
            add_raw(&client, &i.to_string(), "Market update").await;
        }
        enricher.step().await.unwrap().unwrap();

        assert_eq!(client.log_len(RAW_LOG), 2);
        let ops: Vec<String> = client.get_calls().into_iter().map(|c| c.op).collect();
        let ack_at = ops.iter().position(|op| op == "xack").unwrap();
        let trim_at = ops.iter().position(|op| op == "xtrim").unwrap();
        assert!(ack_at < trim_at);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let client = MockRedisClient::new();
        let result = Enricher::new(
            Arc::new(client),
            Arc::new(KeywordClassifier),
            fast_retry(),
            settings(0),
        )
        .await;
        assert!(matches!(
            result,
            Err(EnricherError::InvalidConfiguration(_))
        ));
    }
}
