use std::sync::Arc;
use std::time::Duration;

use common_metrics::{inc, timing_guard};
use common_redis::{Client, LogAppend, RetryPolicy, StreamEntry};
use feed_common::document::{Decoded, LogDocument, ScoredDocument, Sentiment, TopicDocument};
use feed_common::keys::{ENRICHED_LOG, PROCESSED_LOG, SENTIMENT_GROUP};
use feed_common::scorer::{score_with_retry, Scorer};
use feed_common::stage::GroupConsumer;
use health::HealthHandle;
use tracing::{error, info, warn};

use crate::error::SentimentError;
use crate::metrics_constants::*;

#[derive(Debug, Clone)]
pub struct SentimentSettings {
    pub consumer_name: String,
    pub read_count: usize,
    pub read_block: Duration,
    pub processed_max_len: usize,
    pub scorer_max_attempts: u32,
}

/// What happened to one entry of the enriched log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    Skipped,
    Empty,
}

/// Attaches a sentiment to every enriched document and republishes it to the processed log.
pub struct SentimentStage {
    client: Arc<dyn Client + Send + Sync>,
    consumer: GroupConsumer,
    scorer: Arc<dyn Scorer<TopicDocument, Sentiment>>,
    retry_policy: RetryPolicy,
    settings: SentimentSettings,
}

impl SentimentStage {
    pub async fn new(
        client: Arc<dyn Client + Send + Sync>,
        scorer: Arc<dyn Scorer<TopicDocument, Sentiment>>,
        retry_policy: RetryPolicy,
        settings: SentimentSettings,
    ) -> Result<Self, SentimentError> {
        if settings.read_count == 0 || settings.scorer_max_attempts == 0 {
            return Err(SentimentError::InvalidConfiguration(
                "read count and scorer max attempts must be at least 1".to_string(),
            ));
        }

        let consumer = GroupConsumer::join(
            client.clone(),
            ENRICHED_LOG,
            SENTIMENT_GROUP,
            &settings.consumer_name,
        )
        .await?;

        Ok(Self {
            client,
            consumer,
            scorer,
            retry_policy,
            settings,
        })
    }

    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), SentimentError> {
        info!("sentiment stage consuming {}", ENRICHED_LOG);
        loop {
            self.step().await?;
            liveness.report_healthy().await;
        }
    }

    pub async fn step(&mut self) -> Result<Vec<Outcome>, SentimentError> {
        let entries = self
            .consumer
            .read(self.settings.read_count, self.settings.read_block)
            .await?;

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            outcomes.push(self.handle(entry).await?);
        }
        Ok(outcomes)
    }

    // Each entry is acked right after its scored copy is published
    async fn handle(&self, entry: StreamEntry) -> Result<Outcome, SentimentError> {
        inc(DOCUMENTS_IN, &[], 1);

        let doc = match TopicDocument::from_entry(&entry) {
            Decoded::Valid(doc) => doc,
            Decoded::Fallback(doc) => {
                warn!(entry_id = %entry.id, "enriched entry is not a document, using its text");
                inc(FALLBACK_DOCUMENTS, &[], 1);
                doc
            }
            Decoded::Empty => {
                self.consumer.ack(vec![entry.id]).await?;
                return Ok(Outcome::Empty);
            }
        };

        let timer = timing_guard(SCORER_TIME, &[]);
        let scored = score_with_retry(
            self.scorer.as_ref(),
            std::slice::from_ref(&doc),
            &self.retry_policy,
            self.settings.scorer_max_attempts,
        )
        .await;
        timer.fin();

        let outcome = match scored.map(|mut s| s.pop()) {
            Ok(Some(sentiment)) => {
                let fields = ScoredDocument::new(doc, sentiment).to_fields()?;
                self.client
                    .publish_batch(vec![LogAppend::new(PROCESSED_LOG, fields)
                        .capped(self.settings.processed_max_len)])
                    .await?;
                inc(DOCUMENTS_OUT, &[], 1);
                Outcome::Published
            }
            Ok(None) => Outcome::Skipped,
            Err(err) => {
                error!(error = %err, doc_id = doc.id(), "scorer kept failing, skipping document");
                inc(DOCUMENTS_SKIPPED, &[], 1);
                Outcome::Skipped
            }
        };

        self.consumer.ack(vec![entry.id]).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common_redis::MockRedisClient;
    use feed_common::document::{RawDocument, SentimentLabel};
    use feed_common::scorer::{LexiconSentiment, ScorerError};
    use feed_common::topic::Topic;

    struct DownScorer;

    #[async_trait]
    impl Scorer<TopicDocument, Sentiment> for DownScorer {
        async fn score(&self, _batch: &[TopicDocument]) -> Result<Vec<Sentiment>, ScorerError> {
            Err(ScorerError::Status(502))
        }
    }

    fn settings() -> SentimentSettings {
        SentimentSettings {
            consumer_name: "sent-test".to_string(),
            read_count: 10,
            read_block: Duration::from_millis(1),
            processed_max_len: 100,
            scorer_max_attempts: 2,
        }
    }

    async fn stage(
        client: &MockRedisClient,
        scorer: Arc<dyn Scorer<TopicDocument, Sentiment>>,
    ) -> SentimentStage {
        SentimentStage::new(
            Arc::new(client.clone()),
            scorer,
            RetryPolicy::build(1, Duration::from_millis(1)).provide(),
            settings(),
        )
        .await
        .unwrap()
    }

    async fn add_enriched(client: &MockRedisClient, id: &str, title: &str, topic: Topic) {
        let doc = TopicDocument::new(RawDocument::new(id, title, ""), topic);
        client
            .xadd(ENRICHED_LOG.to_string(), doc.to_fields().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scores_and_republishes() {
        let client = MockRedisClient::new();
        let mut stage = stage(&client, Arc::new(LexiconSentiment)).await;
        add_enriched(&client, "1", "Record growth for exporters", Topic::Business).await;
        add_enriched(&client, "2", "Storm damage and flood fear", Topic::Climate).await;

        let outcomes = stage.step().await.unwrap();
        assert_eq!(outcomes, vec![Outcome::Published, Outcome::Published]);

        let processed: Vec<ScoredDocument> = client
            .log_entries(PROCESSED_LOG)
            .iter()
            .filter_map(|e| ScoredDocument::from_entry(e).into_inner())
            .collect();
        assert_eq!(processed.len(), 2);
        assert_eq!(processed[0].id(), "1");
        assert_eq!(processed[0].topic(), Topic::Business);
        assert_eq!(processed[0].sentiment, SentimentLabel::Positive);
        assert_eq!(processed[1].sentiment, SentimentLabel::Negative);
        assert_eq!(client.pending_count(ENRICHED_LOG, SENTIMENT_GROUP), 0);
    }

    #[tokio::test]
    async fn test_each_ack_follows_its_publish() {
        let client = MockRedisClient::new();
        let mut stage = stage(&client, Arc::new(LexiconSentiment)).await;
        add_enriched(&client, "1", "a", Topic::Science).await;
        add_enriched(&client, "2", "b", Topic::Science).await;
        stage.step().await.unwrap();

        let ops: Vec<String> = client
            .get_calls()
            .into_iter()
            .map(|c| c.op)
            .filter(|op| op == "publish_batch" || op == "xack")
            .collect();
        assert_eq!(ops, vec!["publish_batch", "xack", "publish_batch", "xack"]);
    }

    #[tokio::test]
    async fn test_failing_scorer_skips_document() {
        let client = MockRedisClient::new();
        let mut stage = stage(&client, Arc::new(DownScorer)).await;
        add_enriched(&client, "1", "a", Topic::Health).await;

        assert_eq!(stage.step().await.unwrap(), vec![Outcome::Skipped]);
        assert_eq!(client.log_len(PROCESSED_LOG), 0);
        assert_eq!(client.pending_count(ENRICHED_LOG, SENTIMENT_GROUP), 0);
    }

    #[tokio::test]
    async fn test_publish_error_keeps_entry_pending() {
        let client = MockRedisClient::new().fail_next(
            "publish_batch",
            common_redis::CustomRedisError::ParseError("boom".to_string()),
        );
        let mut stage = stage(&client, Arc::new(LexiconSentiment)).await;
        add_enriched(&client, "1", "a", Topic::Health).await;

        assert!(stage.step().await.is_err());
        assert_eq!(client.pending_count(ENRICHED_LOG, SENTIMENT_GROUP), 1);
    }
}
