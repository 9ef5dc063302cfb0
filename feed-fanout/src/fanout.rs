use std::sync::Arc;
use std::time::Duration;

use common_metrics::{gauge, inc, stage_labels, timing_guard};
use common_redis::{Client, FeedPush};
use feed_common::document::{Decoded, LogDocument, TopicDocument};
use feed_common::keys::{feed, feed_tail, topic_group, topic_log, SEEN_PREFIX};
use feed_common::seen::{RedisSeenSet, SeenSet};
use feed_common::stage::GroupConsumer;
use feed_common::topic::Topic;
use health::HealthHandle;
use tracing::{debug, info, warn};

use crate::error::FanoutError;
use crate::metrics_constants::*;
use crate::subscribers::SubscriberCache;

#[derive(Debug, Clone)]
pub struct FanoutSettings {
    pub consumer_name: String,
    pub feed_len: usize,
    pub topic_max_len: usize,
    pub subscriber_cache_ttl: Duration,
    pub seen_ttl: Duration,
    pub read_count: usize,
    pub read_block: Duration,
    pub round_sleep: Duration,
}

/// What one pass over one topic log did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicReport {
    pub consumed: usize,
    pub delivered: usize,
    pub duplicates: usize,
}

struct TopicConsumer {
    topic: Topic,
    consumer: GroupConsumer,
    labels: Vec<(String, String)>,
}

/// Copies every document of every topic log into the feed of each subscriber of that topic,
/// at most once per subscriber and document.
pub struct Fanout {
    client: Arc<dyn Client + Send + Sync>,
    topics: Vec<TopicConsumer>,
    subscribers: SubscriberCache,
    seen: Box<dyn SeenSet>,
    settings: FanoutSettings,
}

impl Fanout {
    pub async fn new(
        client: Arc<dyn Client + Send + Sync>,
        settings: FanoutSettings,
    ) -> Result<Self, FanoutError> {
        if settings.feed_len == 0 || settings.read_count == 0 {
            return Err(FanoutError::InvalidConfiguration(
                "feed length and read count must be at least 1".to_string(),
            ));
        }

        let mut topics = Vec::with_capacity(Topic::ALL.len());
        for topic in Topic::ALL {
            let consumer = GroupConsumer::join(
                client.clone(),
                &topic_log(topic),
                &topic_group(topic),
                &settings.consumer_name,
            )
            .await?;
            topics.push(TopicConsumer {
                topic,
                consumer,
                labels: stage_labels("fanout", &[("topic", topic.as_str())]),
            });
        }

        Ok(Self {
            subscribers: SubscriberCache::new(client.clone(), settings.subscriber_cache_ttl),
            seen: Box::new(RedisSeenSet::new(
                client.clone(),
                SEEN_PREFIX,
                settings.seen_ttl,
            )),
            client,
            topics,
            settings,
        })
    }

    pub async fn run(mut self, liveness: HealthHandle) -> Result<(), FanoutError> {
        info!(
            topics = self.topics.len(),
            feed_len = self.settings.feed_len,
            "fanning out topic logs"
        );
        loop {
            self.round().await?;
            liveness.report_healthy().await;
            tokio::time::sleep(self.settings.round_sleep).await;
        }
    }

    /// Visit every topic once, in a fixed order.
    pub async fn round(&mut self) -> Result<TopicReport, FanoutError> {
        let _timer = timing_guard(ROUND_TIME, &[]);
        let mut total = TopicReport::default();
        for index in 0..self.topics.len() {
            let report = self.fan_topic(index).await?;
            total.consumed += report.consumed;
            total.delivered += report.delivered;
            total.duplicates += report.duplicates;
        }
        Ok(total)
    }

    async fn fan_topic(&mut self, index: usize) -> Result<TopicReport, FanoutError> {
        let topic = self.topics[index].topic;
        let entries = self.topics[index]
            .consumer
            .read(self.settings.read_count, self.settings.read_block)
            .await?;
        if entries.is_empty() {
            return Ok(TopicReport::default());
        }

        let labels = self.topics[index].labels.clone();
        let subscribers = self.subscribers.get(topic).await?;
        gauge(TOPIC_SUBSCRIBERS, &labels, subscribers.len() as f64);

        let mut report = TopicReport {
            consumed: entries.len(),
            ..Default::default()
        };
        inc(DOCUMENTS_IN, &labels, entries.len() as u64);

        let mut ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            ids.push(entry.id.clone());
            let doc = match TopicDocument::from_entry(entry) {
                Decoded::Valid(doc) => doc,
                Decoded::Fallback(doc) => {
                    warn!(entry_id = %entry.id, topic = %topic, "topic entry is not a document, delivering its text");
                    doc
                }
                Decoded::Empty => continue,
            };
            let payload = serde_json::to_string(&doc)?;

            for uid in subscribers.iter() {
                let push = FeedPush {
                    list: feed(*uid),
                    tail_log: feed_tail(*uid),
                    payload: payload.clone(),
                    cap: self.settings.feed_len,
                };
                match self.seen.push_if_unseen(&uid.to_string(), doc.id(), push).await? {
                    Some(_) => report.delivered += 1,
                    None => {
                        debug!(uid, doc_id = doc.id(), "already delivered, skipping");
                        report.duplicates += 1;
                    }
                }
            }
        }

        self.topics[index].consumer.ack(ids).await?;
        let trimmed = self
            .client
            .atomic_trim(topic_log(topic), self.settings.topic_max_len)
            .await?;
        inc(TOPIC_TRIM_OPS, &labels, 1);
        inc(TOPIC_TRIMMED_ENTRIES, &labels, trimmed);

        let length = self.client.xlen(topic_log(topic)).await?;
        gauge(TOPIC_LOG_LENGTH, &labels, length as f64);

        inc(FEED_PUSHES, &labels, report.delivered as u64);
        inc(DELIVERIES_OUT, &labels, report.delivered as u64);
        inc(DUPLICATES_SKIPPED, &labels, report.duplicates as u64);
        Ok(report)
    }
}
