use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{Client, CustomRedisError, FeedPush, LogAppend, ReadFrom, StreamEntry};

/// An in-memory stand-in for the log service.
///
/// It keeps real state (logs with consumer groups and pending entries, lists, expiring sets,
/// sorted sets, scalars) so stages can be driven end to end in tests, records every call, and
/// can be told to fail the next calls of a given operation, either before it applies or after
/// it applied with its reply lost.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    state: Arc<Mutex<MockState>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<CustomRedisError>>>>,
    lost_replies: Arc<Mutex<HashMap<String, VecDeque<CustomRedisError>>>>,
}

type FailureQueues = HashMap<String, VecDeque<CustomRedisError>>;

#[derive(Default)]
struct MockState {
    logs: HashMap<String, MockLog>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    ttls: HashMap<String, u64>,
    sorted_sets: HashMap<String, BTreeMap<String, f64>>,
    scalars: HashMap<String, String>,
}

#[derive(Default)]
struct MockLog {
    next_seq: u64,
    entries: VecDeque<(u64, Vec<(String, String)>)>,
    groups: HashMap<String, MockGroup>,
}

#[derive(Default)]
struct MockGroup {
    last_delivered: u64,
    // seq -> consumer owning the entry until it is acked
    pending: BTreeMap<u64, String>,
}

impl MockLog {
    fn append(&mut self, fields: Vec<(String, String)>) -> String {
        self.next_seq += 1;
        self.entries.push_back((self.next_seq, fields));
        entry_id(self.next_seq)
    }

    fn trim(&mut self, max_len: usize) -> u64 {
        let mut removed = 0;
        while self.entries.len() > max_len {
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    fn fields_of(&self, seq: u64) -> Option<&Vec<(String, String)>> {
        self.entries
            .iter()
            .find(|(entry_seq, _)| *entry_seq == seq)
            .map(|(_, fields)| fields)
    }
}

fn entry_id(seq: u64) -> String {
    format!("{seq}-0")
}

fn parse_entry_id(id: &str) -> Option<u64> {
    id.split('-').next().and_then(|seq| seq.parse().ok())
}

fn to_entry(seq: u64, fields: &[(String, String)]) -> StreamEntry {
    StreamEntry {
        id: entry_id(seq),
        fields: fields.iter().cloned().collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockRedisValue {
    None,
    String(String),
    StringWithTTL(String, u64),
    VecString(Vec<String>),
    Fields(Vec<(String, String)>),
    Usize(usize),
    F64(f64),
}

#[derive(Debug, Clone)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper methods to safely lock the mutexes, a panicking test must not poison the others
    fn lock_state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockRedisCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_failures(&self) -> MutexGuard<'_, FailureQueues> {
        match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_lost_replies(&self) -> MutexGuard<'_, FailureQueues> {
        match self.lost_replies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Hand back `value`, unless a lost reply is queued for `op`.
    fn reply<T>(&self, op: &str, value: T) -> Result<T, CustomRedisError> {
        match self.lock_lost_replies().get_mut(op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    /// Record the call, then return the queued failure for this operation if there is one.
    fn record(&self, op: &str, key: &str, value: MockRedisValue) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: op.to_string(),
            key: key.to_string(),
            value,
        });

        match self.lock_failures().get_mut(op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Make the next call of `op` fail with `err`. Can be called several times to queue failures.
    pub fn fail_next(&self, op: &str, err: CustomRedisError) -> Self {
        self.lock_failures()
            .entry(op.to_string())
            .or_default()
            .push_back(err);
        self.clone()
    }

    /// Let the next call of `op` apply, then fail with `err` as if its reply never arrived.
    /// Honoured by `xreadgroup` and `push_to_feed_once`.
    pub fn lose_reply_next(&self, op: &str, err: CustomRedisError) -> Self {
        self.lock_lost_replies()
            .entry(op.to_string())
            .or_default()
            .push_back(err);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        self.lock_calls().clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<MockRedisCall> {
        self.get_calls()
            .into_iter()
            .filter(|call| call.op == op)
            .collect()
    }

    /// Current entries of a log, oldest first.
    pub fn log_entries(&self, log: &str) -> Vec<StreamEntry> {
        self.lock_state()
            .logs
            .get(log)
            .map(|l| {
                l.entries
                    .iter()
                    .map(|(seq, fields)| to_entry(*seq, fields))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn log_len(&self, log: &str) -> usize {
        self.lock_state()
            .logs
            .get(log)
            .map(|l| l.entries.len())
            .unwrap_or(0)
    }

    pub fn has_group(&self, log: &str, group: &str) -> bool {
        self.lock_state()
            .logs
            .get(log)
            .map(|l| l.groups.contains_key(group))
            .unwrap_or(false)
    }

    /// Entries delivered to the group but not acknowledged yet.
    pub fn pending_count(&self, log: &str, group: &str) -> usize {
        self.lock_state()
            .logs
            .get(log)
            .and_then(|l| l.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    /// List content, head (most recent push) first.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.lock_state()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_members(&self, key: &str) -> HashSet<String> {
        self.lock_state()
            .sets
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.lock_state().ttls.get(key).copied()
    }

    pub fn scalar(&self, key: &str) -> Option<String> {
        self.lock_state().scalars.get(key).cloned()
    }

    /// Drop a key and its expiry, as the server would once its TTL runs out.
    pub fn expire_now(&self, key: &str) {
        let mut state = self.lock_state();
        state.sets.remove(key);
        state.lists.remove(key);
        state.scalars.remove(key);
        state.ttls.remove(key);
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn xadd(
        &self,
        log: String,
        fields: Vec<(String, String)>,
    ) -> Result<String, CustomRedisError> {
        self.record("xadd", &log, MockRedisValue::Fields(fields.clone()))?;

        let mut state = self.lock_state();
        Ok(state.logs.entry(log).or_default().append(fields))
    }

    async fn publish_batch(
        &self,
        appends: Vec<LogAppend>,
    ) -> Result<Vec<String>, CustomRedisError> {
        let logs: Vec<String> = appends.iter().map(|a| a.log.clone()).collect();
        self.record(
            "publish_batch",
            &logs.join(","),
            MockRedisValue::VecString(logs.clone()),
        )?;

        let mut state = self.lock_state();
        let mut ids = Vec::with_capacity(appends.len());
        for append in appends {
            let log = state.logs.entry(append.log).or_default();
            ids.push(log.append(append.fields));
            if let Some(max_len) = append.max_len {
                log.trim(max_len);
            }
        }
        Ok(ids)
    }

    async fn xgroup_create(
        &self,
        log: String,
        group: String,
        start_id: String,
    ) -> Result<(), CustomRedisError> {
        self.record("xgroup_create", &log, MockRedisValue::String(group.clone()))?;

        let mut state = self.lock_state();
        let log = state.logs.entry(log).or_default();
        let last_delivered = if start_id == "$" {
            log.next_seq
        } else {
            parse_entry_id(&start_id).unwrap_or(0)
        };
        log.groups.entry(group).or_insert_with(|| MockGroup {
            last_delivered,
            pending: BTreeMap::new(),
        });
        Ok(())
    }

    async fn xreadgroup(
        &self,
        log: String,
        group: String,
        consumer: String,
        from: ReadFrom,
        count: usize,
        _block: Option<Duration>,
    ) -> Result<Vec<StreamEntry>, CustomRedisError> {
        self.record("xreadgroup", &log, MockRedisValue::Usize(count))?;

        let mut state = self.lock_state();
        let Some(log_state) = state.logs.get_mut(&log) else {
            return Err(CustomRedisError::from_redis_kind(
                crate::RedisErrorKind::ResponseError,
                "NOGROUP No such key or consumer group",
            ));
        };
        let Some(group_state) = log_state.groups.get(&group) else {
            return Err(CustomRedisError::from_redis_kind(
                crate::RedisErrorKind::ResponseError,
                "NOGROUP No such key or consumer group",
            ));
        };

        let after = match &from {
            ReadFrom::New => None,
            ReadFrom::Pending => Some(0),
            ReadFrom::PendingAfter(id) => Some(parse_entry_id(id).unwrap_or(0)),
        };

        match after {
            Some(after) => {
                // Like the server, entries trimmed away while pending come back without fields
                let owned: Vec<u64> = group_state
                    .pending
                    .range(after.saturating_add(1)..)
                    .filter(|(_, owner)| **owner == consumer)
                    .map(|(seq, _)| *seq)
                    .take(count)
                    .collect();
                Ok(owned
                    .into_iter()
                    .map(|seq| match log_state.fields_of(seq) {
                        Some(fields) => to_entry(seq, fields),
                        None => to_entry(seq, &[]),
                    })
                    .collect())
            }
            None => {
                let last_delivered = group_state.last_delivered;
                let batch: Vec<StreamEntry> = log_state
                    .entries
                    .iter()
                    .filter(|(seq, _)| *seq > last_delivered)
                    .take(count)
                    .map(|(seq, fields)| to_entry(*seq, fields))
                    .collect();

                if let Some(group_state) = log_state.groups.get_mut(&group) {
                    for entry in &batch {
                        if let Some(seq) = parse_entry_id(&entry.id) {
                            group_state.last_delivered = group_state.last_delivered.max(seq);
                            group_state.pending.insert(seq, consumer.clone());
                        }
                    }
                }
                drop(state);
                self.reply("xreadgroup", batch)
            }
        }
    }

    async fn xack(
        &self,
        log: String,
        group: String,
        ids: Vec<String>,
    ) -> Result<u64, CustomRedisError> {
        self.record("xack", &log, MockRedisValue::VecString(ids.clone()))?;

        let mut state = self.lock_state();
        let Some(group_state) = state
            .logs
            .get_mut(&log)
            .and_then(|l| l.groups.get_mut(&group))
        else {
            return Ok(0);
        };

        let mut acked = 0;
        for id in ids {
            if let Some(seq) = parse_entry_id(&id) {
                if group_state.pending.remove(&seq).is_some() {
                    acked += 1;
                }
            }
        }
        Ok(acked)
    }

    async fn xtrim(&self, log: String, max_len: usize) -> Result<u64, CustomRedisError> {
        self.record("xtrim", &log, MockRedisValue::Usize(max_len))?;

        let mut state = self.lock_state();
        Ok(state
            .logs
            .get_mut(&log)
            .map(|l| l.trim(max_len))
            .unwrap_or(0))
    }

    async fn atomic_trim(&self, log: String, max_len: usize) -> Result<u64, CustomRedisError> {
        self.record("atomic_trim", &log, MockRedisValue::Usize(max_len))?;

        let mut state = self.lock_state();
        Ok(state
            .logs
            .get_mut(&log)
            .map(|l| l.trim(max_len))
            .unwrap_or(0))
    }

    async fn xlen(&self, log: String) -> Result<u64, CustomRedisError> {
        self.record("xlen", &log, MockRedisValue::None)?;

        Ok(self.log_len(&log) as u64)
    }

    async fn sadd_expire_nx(
        &self,
        set: String,
        member: String,
        ttl_seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        self.record(
            "sadd_expire_nx",
            &set,
            MockRedisValue::StringWithTTL(member.clone(), ttl_seconds),
        )?;

        let mut state = self.lock_state();
        let added = state.sets.entry(set.clone()).or_default().insert(member);
        state.ttls.entry(set).or_insert(ttl_seconds);
        Ok(added)
    }

    async fn push_to_feed(
        &self,
        list: String,
        tail_log: String,
        payload: String,
        cap: usize,
    ) -> Result<u64, CustomRedisError> {
        self.record("push_to_feed", &list, MockRedisValue::String(payload.clone()))?;

        let mut state = self.lock_state();
        let feed = state.lists.entry(list).or_default();
        feed.push_front(payload.clone());
        feed.truncate(cap);
        let len = feed.len() as u64;

        let tail = state.logs.entry(tail_log).or_default();
        tail.append(vec![("data".to_string(), payload)]);
        tail.trim(cap);
        Ok(len)
    }

    async fn push_to_feed_once(
        &self,
        seen_set: String,
        member: String,
        ttl_seconds: u64,
        push: FeedPush,
    ) -> Result<Option<u64>, CustomRedisError> {
        self.record(
            "push_to_feed_once",
            &push.list,
            MockRedisValue::StringWithTTL(member.clone(), ttl_seconds),
        )?;

        let mut state = self.lock_state();
        let added = state.sets.entry(seen_set.clone()).or_default().insert(member);
        state.ttls.entry(seen_set).or_insert(ttl_seconds);
        if !added {
            drop(state);
            return self.reply("push_to_feed_once", None);
        }

        let feed = state.lists.entry(push.list).or_default();
        feed.push_front(push.payload.clone());
        feed.truncate(push.cap);
        let len = feed.len() as u64;

        let tail = state.logs.entry(push.tail_log).or_default();
        tail.append(vec![("data".to_string(), push.payload)]);
        tail.trim(push.cap);
        drop(state);
        self.reply("push_to_feed_once", Some(len))
    }

    async fn brpop(
        &self,
        list: String,
        _timeout: Duration,
    ) -> Result<Option<String>, CustomRedisError> {
        self.record("brpop", &list, MockRedisValue::None)?;

        let mut state = self.lock_state();
        Ok(state.lists.get_mut(&list).and_then(|l| l.pop_back()))
    }

    async fn llen(&self, list: String) -> Result<u64, CustomRedisError> {
        self.record("llen", &list, MockRedisValue::None)?;

        Ok(self.list(&list).len() as u64)
    }

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError> {
        self.record("zadd", &k, MockRedisValue::F64(score))?;

        let mut state = self.lock_state();
        state.sorted_sets.entry(k).or_default().insert(member, score);
        Ok(())
    }

    async fn zrange(&self, k: String) -> Result<Vec<String>, CustomRedisError> {
        self.record("zrange", &k, MockRedisValue::None)?;

        let state = self.lock_state();
        let Some(members) = state.sorted_sets.get(&k) else {
            return Ok(Vec::new());
        };
        let mut ordered: Vec<(&String, &f64)> = members.iter().collect();
        ordered.sort_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)));
        Ok(ordered.into_iter().map(|(m, _)| m.clone()).collect())
    }

    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        self.record("get", &k, MockRedisValue::None)?;

        self.scalar(&k).ok_or(CustomRedisError::NotFound)
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        self.record("set", &k, MockRedisValue::String(v.clone()))?;

        self.lock_state().scalars.insert(k, v);
        Ok(())
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        self.record("incr", &k, MockRedisValue::None)?;

        let mut state = self.lock_state();
        let current = match state.scalars.get(&k) {
            Some(v) => v.parse::<i64>().map_err(|_| {
                CustomRedisError::ParseError(format!("value at {k} is not an integer"))
            })?,
            None => 0,
        };
        state.scalars.insert(k, (current + 1).to_string());
        Ok(current + 1)
    }

    async fn set_and_xadd(
        &self,
        k: String,
        v: String,
        log: String,
        fields: Vec<(String, String)>,
    ) -> Result<String, CustomRedisError> {
        self.record("set_and_xadd", &k, MockRedisValue::String(v.clone()))?;

        let mut state = self.lock_state();
        state.scalars.insert(k, v);
        Ok(state.logs.entry(log).or_default().append(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(payload: &str) -> Vec<(String, String)> {
        vec![("data".to_string(), payload.to_string())]
    }

    #[tokio::test]
    async fn test_group_reads_each_entry_once() {
        let client = MockRedisClient::new();
        client
            .xgroup_create("log".into(), "cg".into(), "0".into())
            .await
            .unwrap();
        for i in 0..5 {
            client.xadd("log".into(), data(&i.to_string())).await.unwrap();
        }

        let first = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 3, None)
            .await
            .unwrap();
        let second = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 3, None)
            .await
            .unwrap();
        let third = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 3, None)
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert!(third.is_empty());
        assert_eq!(client.pending_count("log", "cg"), 5);
    }

    #[tokio::test]
    async fn test_unacked_entries_are_redelivered_as_pending() {
        let client = MockRedisClient::new();
        client
            .xgroup_create("log".into(), "cg".into(), "0".into())
            .await
            .unwrap();
        client.xadd("log".into(), data("a")).await.unwrap();
        client.xadd("log".into(), data("b")).await.unwrap();

        let batch = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 10, None)
            .await
            .unwrap();
        client
            .xack("log".into(), "cg".into(), vec![batch[0].id.clone()])
            .await
            .unwrap();

        let pending = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::Pending, 10, None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].field("data"), Some("b"));

        let other_consumer = client
            .xreadgroup("log".into(), "cg".into(), "c2".into(), ReadFrom::Pending, 10, None)
            .await
            .unwrap();
        assert!(other_consumer.is_empty());
    }

    #[tokio::test]
    async fn test_group_create_is_idempotent() {
        let client = MockRedisClient::new();
        client
            .xgroup_create("log".into(), "cg".into(), "0".into())
            .await
            .unwrap();
        client.xadd("log".into(), data("a")).await.unwrap();
        client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 10, None)
            .await
            .unwrap();

        // Recreating must not rewind the group
        client
            .xgroup_create("log".into(), "cg".into(), "0".into())
            .await
            .unwrap();
        let again = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 10, None)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_trim_keeps_most_recent() {
        let client = MockRedisClient::new();
        for i in 0..10 {
            client.xadd("log".into(), data(&i.to_string())).await.unwrap();
        }

        let removed = client.atomic_trim("log".into(), 4).await.unwrap();
        let remaining: Vec<String> = client
            .log_entries("log")
            .iter()
            .filter_map(|e| e.field("data").map(str::to_string))
            .collect();

        assert_eq!(removed, 6);
        assert_eq!(remaining, vec!["6", "7", "8", "9"]);
    }

    #[tokio::test]
    async fn test_seen_set_ttl_is_set_once() {
        let client = MockRedisClient::new();
        assert!(client
            .sadd_expire_nx("seen".into(), "1".into(), 100)
            .await
            .unwrap());
        assert!(!client
            .sadd_expire_nx("seen".into(), "1".into(), 200)
            .await
            .unwrap());
        assert!(client
            .sadd_expire_nx("seen".into(), "2".into(), 300)
            .await
            .unwrap());
        assert_eq!(client.ttl("seen"), Some(100));
    }

    #[tokio::test]
    async fn test_feed_is_capped_and_mirrored() {
        let client = MockRedisClient::new();
        for i in 0..5 {
            let len = client
                .push_to_feed("feed:1".into(), "feed_stream:1".into(), i.to_string(), 3)
                .await
                .unwrap();
            assert!(len <= 3);
        }

        assert_eq!(client.list("feed:1"), vec!["4", "3", "2"]);
        assert_eq!(client.log_len("feed_stream:1"), 3);
        assert_eq!(
            client.brpop("feed:1".into(), Duration::from_millis(10)).await.unwrap(),
            Some("2".to_string())
        );
    }

    fn feed_push(payload: &str) -> FeedPush {
        FeedPush {
            list: "feed:1".to_string(),
            tail_log: "feed_stream:1".to_string(),
            payload: payload.to_string(),
            cap: 10,
        }
    }

    #[tokio::test]
    async fn test_push_once_is_a_no_op_when_repeated() {
        let client = MockRedisClient::new();

        let first = client
            .push_to_feed_once("feed_seen:1".into(), "42".into(), 60, feed_push("doc"))
            .await
            .unwrap();
        let again = client
            .push_to_feed_once("feed_seen:1".into(), "42".into(), 60, feed_push("doc"))
            .await
            .unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(again, None);
        assert_eq!(client.list("feed:1"), vec!["doc"]);
        assert_eq!(client.log_len("feed_stream:1"), 1);
        assert_eq!(client.ttl("feed_seen:1"), Some(60));
    }

    #[tokio::test]
    async fn test_lost_read_reply_leaves_entries_pending_after_last_seen() {
        let client = MockRedisClient::new();
        client
            .xgroup_create("log".into(), "cg".into(), "0".into())
            .await
            .unwrap();
        client.xadd("log".into(), data("a")).await.unwrap();
        let first = client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 10, None)
            .await
            .unwrap();

        client.xadd("log".into(), data("b")).await.unwrap();
        let client = client.lose_reply_next("xreadgroup", CustomRedisError::Timeout);
        assert!(client
            .xreadgroup("log".into(), "cg".into(), "c1".into(), ReadFrom::New, 10, None)
            .await
            .is_err());
        assert_eq!(client.pending_count("log", "cg"), 2);

        let recovered = client
            .xreadgroup(
                "log".into(),
                "cg".into(),
                "c1".into(),
                ReadFrom::PendingAfter(first[0].id.clone()),
                10,
                None,
            )
            .await
            .unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].field("data"), Some("b"));
    }

    #[tokio::test]
    async fn test_queued_failures() {
        let client = MockRedisClient::new().fail_next("get", CustomRedisError::Timeout);
        client.set("k".into(), "v".into()).await.unwrap();

        assert!(matches!(
            client.get("k".into()).await,
            Err(CustomRedisError::Timeout)
        ));
        assert_eq!(client.get("k".into()).await.unwrap(), "v");
        assert_eq!(client.calls_to("get").len(), 2);
    }
}
