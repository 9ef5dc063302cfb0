use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_eq;
use common_redis::{Client, MockRedisClient};
use feed_aggregator::aggregator::{Aggregator, AggregatorSettings};
use feed_common::document::{LogDocument, RawDocument, ScoredDocument, Sentiment, SentimentLabel, TopicDocument};
use feed_common::keys::{AGGREGATOR_GROUP, PROCESSED_LOG, STATS_LOG};
use feed_common::topic::Topic;
use serde_json::json;

const WINDOW_START: u64 = 1_700_000_040;

fn settings() -> AggregatorSettings {
    AggregatorSettings {
        consumer_name: "agg-1".to_string(),
        window_secs: 60,
        read_count: 256,
        read_block: Duration::from_millis(1),
    }
}

async fn add_processed(client: &MockRedisClient, id: u32, topic: Topic, label: SentimentLabel) {
    let doc = ScoredDocument::new(
        TopicDocument::new(RawDocument::new(id.to_string(), "headline", ""), topic),
        Sentiment {
            label,
            confidence: 0.9,
        },
    );
    client
        .xadd(PROCESSED_LOG.to_string(), doc.to_fields().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn five_documents_flush_once_after_the_boundary() {
    let client = MockRedisClient::new();
    let mut aggregator = Aggregator::new(Arc::new(client.clone()), settings(), WINDOW_START + 5)
        .await
        .unwrap();

    let docs = [
        (Topic::Science, SentimentLabel::Positive),
        (Topic::Science, SentimentLabel::Positive),
        (Topic::Science, SentimentLabel::Negative),
        (Topic::Finance, SentimentLabel::Neutral),
        (Topic::Finance, SentimentLabel::Negative),
    ];
    for (i, (topic, label)) in docs.into_iter().enumerate() {
        add_processed(&client, i as u32, topic, label).await;
    }

    let report = aggregator.step(WINDOW_START + 10).await.unwrap();
    assert_eq!(report.counted, 5);
    assert_eq!(report.flushed, None);
    assert_eq!(client.pending_count(PROCESSED_LOG, AGGREGATOR_GROUP), 0);

    // Still inside the window: nothing persisted
    let report = aggregator.step(WINDOW_START + 59).await.unwrap();
    assert_eq!(report.flushed, None);
    assert_eq!(client.log_len(STATS_LOG), 0);

    let report = aggregator.step(WINDOW_START + 60).await.unwrap();
    let key = format!("bucket:{WINDOW_START}");
    assert_eq!(report.flushed, Some(key.clone()));

    let stored: serde_json::Value =
        serde_json::from_str(&client.scalar(&key).expect("snapshot stored")).unwrap();
    assert_json_eq!(
        stored,
        json!({
            "science": {"count": 3, "pos": 2, "neg": 1, "neu": 0},
            "finance": {"count": 2, "pos": 0, "neg": 1, "neu": 1}
        })
    );
    let total: u64 = stored
        .as_object()
        .unwrap()
        .values()
        .map(|b| b["count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 5);

    let stats = client.log_entries(STATS_LOG);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].field("bucket"), Some(key.as_str()));

    // The next window is empty and must never produce a snapshot
    let report = aggregator.step(WINDOW_START + 200).await.unwrap();
    assert_eq!(report.flushed, None);
    assert_eq!(client.log_len(STATS_LOG), 1);
    assert_eq!(aggregator.window().start(), WINDOW_START + 180);
}

#[tokio::test]
async fn documents_read_after_the_roll_belong_to_the_new_window() {
    let client = MockRedisClient::new();
    let mut aggregator = Aggregator::new(Arc::new(client.clone()), settings(), WINDOW_START)
        .await
        .unwrap();

    add_processed(&client, 1, Topic::Sports, SentimentLabel::Positive).await;
    let report = aggregator.step(WINDOW_START + 61).await.unwrap();

    // The old window was empty when it closed
    assert_eq!(report.flushed, None);
    assert_eq!(report.counted, 1);
    assert_eq!(aggregator.window().start(), WINDOW_START + 60);
    assert_eq!(aggregator.window().documents(), 1);
}
