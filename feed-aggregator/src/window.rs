//! Fixed, non-overlapping time windows of per-topic sentiment counters.

use std::collections::BTreeMap;

use feed_common::document::SentimentLabel;
use feed_common::topic::Topic;
use serde::{Deserialize, Serialize};

/// Counters of one topic inside one window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub count: u64,
    pub pos: u64,
    pub neg: u64,
    pub neu: u64,
}

impl Bucket {
    fn record(&mut self, label: SentimentLabel) {
        self.count += 1;
        match label {
            SentimentLabel::Positive => self.pos += 1,
            SentimentLabel::Negative => self.neg += 1,
            SentimentLabel::Neutral => self.neu += 1,
        }
    }
}

/// A closed window, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub window_start: u64,
    pub buckets: BTreeMap<Topic, Bucket>,
}

impl Snapshot {
    pub fn total(&self) -> u64 {
        self.buckets.values().map(|b| b.count).sum()
    }
}

#[derive(Debug)]
pub struct Window {
    length: u64,
    start: u64,
    buckets: BTreeMap<Topic, Bucket>,
}

impl Window {
    /// Open the window containing `now`. Boundaries are multiples of `length` since the epoch.
    /// `length` must not be zero.
    pub fn new(length: u64, now: u64) -> Self {
        Self {
            length,
            start: now / length * length,
            buckets: BTreeMap::new(),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn documents(&self) -> u64 {
        self.buckets.values().map(|b| b.count).sum()
    }

    pub fn record(&mut self, topic: Topic, label: SentimentLabel) {
        self.buckets.entry(topic).or_default().record(label);
    }

    /// Close every window that ended at or before `now`.
    ///
    /// Only the current window can hold documents, so at most one snapshot comes out; windows
    /// skipped while the stage was idle are empty and never produce one.
    pub fn roll(&mut self, now: u64) -> Option<Snapshot> {
        let mut snapshot = None;
        while now >= self.end() {
            let buckets = std::mem::take(&mut self.buckets);
            if buckets.values().any(|b| b.count > 0) {
                snapshot = Some(Snapshot {
                    window_start: self.start,
                    buckets,
                });
            }
            self.start += self.length;
        }
        snapshot
    }
}
