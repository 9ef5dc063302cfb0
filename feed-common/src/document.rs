//! Documents as they travel between stages.
//!
//! Each stage publishes a strictly larger copy of what it consumed:
//! `RawDocument` (ingest) ⊂ `TopicDocument` (enricher) ⊂ `ScoredDocument` (sentiment).
//! A log entry carries the JSON document in its single `data` field.

use std::fmt;

use common_redis::StreamEntry;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::topic::Topic;

pub const DATA_FIELD: &str = "data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            summary: None,
            tags: Vec::new(),
        }
    }

    /// The text scorers look at.
    pub fn text(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{} {} {}", self.title, summary, self.body),
            None => format!("{} {}", self.title, self.body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDocument {
    #[serde(flatten)]
    pub raw: RawDocument,
    pub topic: Topic,
}

impl TopicDocument {
    pub fn new(raw: RawDocument, topic: Topic) -> Self {
        Self { raw, topic }
    }

    pub fn id(&self) -> &str {
        &self.raw.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

/// Scorers name labels in many ways ("POSITIVE", "pos", "Negative"...), only the prefix counts.
impl From<String> for SentimentLabel {
    fn from(label: String) -> Self {
        let label = label.trim().to_lowercase();
        if label.starts_with("pos") {
            SentimentLabel::Positive
        } else if label.starts_with("neg") {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    #[serde(flatten)]
    pub doc: TopicDocument,
    pub sentiment: SentimentLabel,
    pub confidence: f64,
}

impl ScoredDocument {
    pub fn new(doc: TopicDocument, sentiment: Sentiment) -> Self {
        Self {
            doc,
            sentiment: sentiment.label,
            confidence: sentiment.confidence,
        }
    }

    pub fn id(&self) -> &str {
        self.doc.id()
    }

    pub fn topic(&self) -> Topic {
        self.doc.topic
    }
}

/// Outcome of reading a document out of a log entry.
#[derive(Debug, PartialEq)]
pub enum Decoded<T> {
    Valid(T),
    /// The payload was not a valid document, this one was rebuilt from the raw text.
    Fallback(T),
    /// Nothing to decode: the entry was trimmed away while pending.
    Empty,
}

impl<T> Decoded<T> {
    pub fn into_inner(self) -> Option<T> {
        match self {
            Decoded::Valid(doc) | Decoded::Fallback(doc) => Some(doc),
            Decoded::Empty => None,
        }
    }
}

pub trait LogDocument: Serialize + DeserializeOwned {
    /// Rebuild a document from a payload that does not parse as one.
    fn fallback(entry_id: &str, payload: &str) -> Self;

    fn to_fields(&self) -> Result<Vec<(String, String)>, serde_json::Error> {
        Ok(vec![(DATA_FIELD.to_string(), serde_json::to_string(self)?)])
    }

    fn from_payload(entry_id: &str, payload: &str) -> Decoded<Self> {
        match serde_json::from_str(payload) {
            Ok(doc) => Decoded::Valid(doc),
            Err(_) => Decoded::Fallback(Self::fallback(entry_id, payload)),
        }
    }

    fn from_entry(entry: &StreamEntry) -> Decoded<Self> {
        if entry.fields.is_empty() {
            return Decoded::Empty;
        }
        match entry.field(DATA_FIELD) {
            Some(payload) => Self::from_payload(&entry.id, payload),
            // Producers that write the document as plain fields instead of a JSON payload
            None => {
                let as_object = serde_json::Value::Object(
                    entry
                        .fields
                        .iter()
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                        .collect(),
                );
                if let Ok(doc) = serde_json::from_value(as_object) {
                    return Decoded::Valid(doc);
                }

                let mut fields: Vec<String> = entry
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                fields.sort();
                Decoded::Fallback(Self::fallback(&entry.id, &fields.join(" ")))
            }
        }
    }
}

impl LogDocument for RawDocument {
    fn fallback(entry_id: &str, payload: &str) -> Self {
        RawDocument::new(entry_id, payload.trim(), "")
    }
}

impl LogDocument for TopicDocument {
    fn fallback(entry_id: &str, payload: &str) -> Self {
        let raw = RawDocument::from_payload(entry_id, payload)
            .into_inner()
            .unwrap_or_else(|| RawDocument::fallback(entry_id, payload));
        let topic = Topic::classify(&raw.text());
        TopicDocument::new(raw, topic)
    }
}

impl LogDocument for ScoredDocument {
    fn fallback(entry_id: &str, payload: &str) -> Self {
        let doc = TopicDocument::from_payload(entry_id, payload)
            .into_inner()
            .unwrap_or_else(|| TopicDocument::fallback(entry_id, payload));
        ScoredDocument::new(
            doc,
            Sentiment {
                label: SentimentLabel::Neutral,
                confidence: 0.0,
            },
        )
    }
}

// Older producers wrote numeric ids
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::String(id) => id,
        Id::Number(id) => id.to_string(),
    })
}
