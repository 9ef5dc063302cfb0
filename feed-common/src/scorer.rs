//! Scoring collaborators. A scorer takes a whole batch and answers one output per input,
//! in order. Failures are per batch.

use std::time::Duration;

use async_trait::async_trait;
use common_redis::RetryPolicy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::document::{RawDocument, Sentiment, SentimentLabel, TopicDocument};
use crate::topic::Topic;

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("scorer request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("scorer answered with status {0}")]
    Status(u16),
    #[error("scorer returned {got} results for a batch of {expected}")]
    LengthMismatch { expected: usize, got: usize },
}

#[async_trait]
pub trait Scorer<I: Sync, O: Send>: Send + Sync {
    async fn score(&self, batch: &[I]) -> Result<Vec<O>, ScorerError>;
}

/// Score a batch, retrying the whole batch with backoff up to `max_attempts` times overall.
pub async fn score_with_retry<I, O>(
    scorer: &dyn Scorer<I, O>,
    batch: &[I],
    retry_policy: &RetryPolicy,
    max_attempts: u32,
) -> Result<Vec<O>, ScorerError>
where
    I: Sync,
    O: Send,
{
    let mut attempt = 1;
    loop {
        let err = match scorer.score(batch).await {
            Ok(scores) if scores.len() == batch.len() => return Ok(scores),
            Ok(scores) => ScorerError::LengthMismatch {
                expected: batch.len(),
                got: scores.len(),
            },
            Err(err) => err,
        };

        if attempt >= max_attempts {
            return Err(err);
        }
        let backoff = retry_policy.retry_interval(attempt);
        warn!(error = %err, attempt, "scorer failed, retrying in {:?}", backoff);
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Topic classification by keyword vote.
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

#[async_trait]
impl Scorer<RawDocument, Topic> for KeywordClassifier {
    async fn score(&self, batch: &[RawDocument]) -> Result<Vec<Topic>, ScorerError> {
        Ok(batch.iter().map(|doc| Topic::classify(&doc.text())).collect())
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "win", "wins", "won", "success", "growth", "gain", "gains", "record",
    "breakthrough", "improve", "improved", "hope", "celebrate", "boost", "rally", "recovery",
    "best", "positive", "strong", "praise",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "loss", "losses", "lose", "crisis", "crash", "fall", "falls", "fear", "war", "death",
    "deaths", "decline", "fail", "failed", "scandal", "worst", "negative", "weak", "threat",
    "attack", "collapse",
];

/// Sentiment from counting lexicon hits over the document text.
#[derive(Debug, Default, Clone)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn sentiment(text: &str) -> Sentiment {
        let (mut positive, mut negative) = (0u32, 0u32);
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if POSITIVE_WORDS.contains(&word.as_str()) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&word.as_str()) {
                negative += 1;
            }
        }

        let hits = f64::from(positive + negative);
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment {
                label: SentimentLabel::Positive,
                confidence: f64::from(positive) / hits,
            },
            std::cmp::Ordering::Less => Sentiment {
                label: SentimentLabel::Negative,
                confidence: f64::from(negative) / hits,
            },
            std::cmp::Ordering::Equal => Sentiment {
                label: SentimentLabel::Neutral,
                confidence: 0.5,
            },
        }
    }
}

#[async_trait]
impl Scorer<TopicDocument, Sentiment> for LexiconSentiment {
    async fn score(&self, batch: &[TopicDocument]) -> Result<Vec<Sentiment>, ScorerError> {
        Ok(batch
            .iter()
            .map(|doc| Self::sentiment(&doc.raw.text()))
            .collect())
    }
}

/// Posts `{"inputs": [...]}` to an inference endpoint and expects a JSON array back.
#[derive(Debug, Clone)]
pub struct HttpScorer {
    client: reqwest::Client,
    url: String,
}

impl HttpScorer {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ScorerError> {
        let client = reqwest::Client::builder()
            .user_agent("feed-pipeline")
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a, I> {
    inputs: &'a [I],
}

#[async_trait]
impl<I, O> Scorer<I, O> for HttpScorer
where
    I: Serialize + Sync,
    O: DeserializeOwned + Send,
{
    async fn score(&self, batch: &[I]) -> Result<Vec<O>, ScorerError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ScoreRequest { inputs: batch })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScorerError::Status(status.as_u16()));
        }
        Ok(response.json::<Vec<O>>().await?)
    }
}
