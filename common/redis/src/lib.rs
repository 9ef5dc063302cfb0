use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// Re-export ErrorKind and RetryMethod so consumers can construct CustomRedisError in tests
// and understand retry behavior
pub use redis::ErrorKind as RedisErrorKind;
pub use redis::RetryMethod;

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

impl From<std::string::FromUtf8Error> for CustomRedisError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CustomRedisError::ParseError(err.to_string())
    }
}

impl CustomRedisError {
    /// Create a Redis error from an ErrorKind (primarily for testing)
    pub fn from_redis_kind(kind: redis::ErrorKind, description: &'static str) -> Self {
        CustomRedisError::Redis(Arc::new(redis::RedisError::from((kind, description))))
    }

    /// Determine if this error is unrecoverable and should not be retried
    ///
    /// Returns `true` for configuration errors and permanent failures.
    /// Returns `false` for transient network/connection issues that may resolve on retry.
    pub fn is_unrecoverable_error(&self) -> bool {
        !self.is_transient()
    }

    /// Transient errors are the ones the client retries by itself, after reconnecting.
    ///
    /// Server replies (WRONGTYPE, NOGROUP, script errors...) are not transient: the same
    /// command would fail the same way against a fresh connection.
    pub fn is_transient(&self) -> bool {
        match self {
            CustomRedisError::Timeout => true,
            CustomRedisError::InvalidConfiguration(_) => false,
            CustomRedisError::ParseError(_) => false,
            CustomRedisError::NotFound => false,
            CustomRedisError::Redis(err) => {
                if Self::is_config_error(err) {
                    return false;
                }
                err.is_io_error()
                    || err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_timeout()
                    || matches!(
                        err.kind(),
                        redis::ErrorKind::IoError
                            | redis::ErrorKind::TryAgain
                            | redis::ErrorKind::BusyLoadingError
                            | redis::ErrorKind::MasterDown
                    )
            }
        }
    }

    /// Check if a Redis error is a configuration error that should never be retried
    fn is_config_error(err: &redis::RedisError) -> bool {
        matches!(
            err.kind(),
            redis::ErrorKind::InvalidClientConfig | redis::ErrorKind::AuthenticationFailed
        )
    }

    /// Determine the appropriate retry strategy for this error
    ///
    /// Returns a `RetryMethod` indicating how (if at all) this request should be retried.
    /// Delegates to redis crate's `retry_method()` for transient Redis errors.
    pub fn retry_method(&self) -> RetryMethod {
        match self {
            // Timeouts: wait before retrying to avoid hammering the service
            CustomRedisError::Timeout => RetryMethod::WaitAndRetry,
            CustomRedisError::InvalidConfiguration(_) => RetryMethod::NoRetry,
            CustomRedisError::ParseError(_) => RetryMethod::NoRetry,
            CustomRedisError::NotFound => RetryMethod::NoRetry,
            CustomRedisError::Redis(err) => {
                if !self.is_transient() {
                    RetryMethod::NoRetry
                } else {
                    err.retry_method()
                }
            }
        }
    }

    /// The group we tried to create already exists. Creating groups is idempotent for us.
    pub fn is_busy_group(&self) -> bool {
        match self {
            CustomRedisError::Redis(err) => err.code() == Some("BUSYGROUP"),
            _ => false,
        }
    }
}

/// One entry read from a log, with its server assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Where a consumer group read starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFrom {
    /// Entries never delivered to any consumer of the group (`>`).
    New,
    /// Entries already delivered to this consumer but never acknowledged (`0`).
    Pending,
    /// Unacknowledged entries of this consumer with an id above the given one.
    PendingAfter(String),
}

impl ReadFrom {
    pub fn as_id(&self) -> &str {
        match self {
            ReadFrom::New => ">",
            ReadFrom::Pending => "0",
            ReadFrom::PendingAfter(id) => id,
        }
    }
}

/// An append to one log, optionally capping that log in the same round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAppend {
    pub log: String,
    pub fields: Vec<(String, String)>,
    pub max_len: Option<usize>,
}

impl LogAppend {
    pub fn new(log: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            log: log.into(),
            fields,
            max_len: None,
        }
    }

    pub fn capped(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

/// A push to a capped feed list, mirrored into a capped tail log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPush {
    pub list: String,
    pub tail_log: String,
    pub payload: String,
    pub cap: usize,
}

/// The contract every pipeline stage holds against the log service.
///
/// Implementations retry transient failures on their own, so callers only ever see
/// errors that would not go away by trying again. Reads of new group entries are the
/// exception: a lost reply may already have handed entries to the consumer, so a transient
/// failure there is reported once the connection is back and the caller resumes from its
/// pending entries.
#[async_trait]
pub trait Client {
    /// Append one entry, returning its id.
    async fn xadd(
        &self,
        log: String,
        fields: Vec<(String, String)>,
    ) -> Result<String, CustomRedisError>;

    /// Append several entries as a single MULTI/EXEC transaction, trimming each capped log.
    async fn publish_batch(&self, appends: Vec<LogAppend>)
        -> Result<Vec<String>, CustomRedisError>;

    /// Create a consumer group (and the log if missing). Succeeds if the group already exists.
    async fn xgroup_create(
        &self,
        log: String,
        group: String,
        start_id: String,
    ) -> Result<(), CustomRedisError>;

    async fn xreadgroup(
        &self,
        log: String,
        group: String,
        consumer: String,
        from: ReadFrom,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamEntry>, CustomRedisError>;

    async fn xack(
        &self,
        log: String,
        group: String,
        ids: Vec<String>,
    ) -> Result<u64, CustomRedisError>;

    /// Exact trim to the `max_len` most recent entries, returns how many were removed.
    async fn xtrim(&self, log: String, max_len: usize) -> Result<u64, CustomRedisError>;

    /// Same as `xtrim` but executed server-side as a script, in one round trip.
    async fn atomic_trim(&self, log: String, max_len: usize) -> Result<u64, CustomRedisError>;

    async fn xlen(&self, log: String) -> Result<u64, CustomRedisError>;

    /// Add a member to a set; the expiry is only set when the set has none yet.
    /// Returns true if the member was not present before.
    async fn sadd_expire_nx(
        &self,
        set: String,
        member: String,
        ttl_seconds: u64,
    ) -> Result<bool, CustomRedisError>;

    /// Push to the head of a capped list and mirror into a capped log, atomically.
    /// Returns the list length after the push.
    async fn push_to_feed(
        &self,
        list: String,
        tail_log: String,
        payload: String,
        cap: usize,
    ) -> Result<u64, CustomRedisError>;

    /// Record `member` in `seen_set` and, only if it was not there, run `push`. Both happen in
    /// one server-side step, so repeating the call never pushes twice.
    /// Returns the list length after the push, `None` when the member was already seen.
    async fn push_to_feed_once(
        &self,
        seen_set: String,
        member: String,
        ttl_seconds: u64,
        push: FeedPush,
    ) -> Result<Option<u64>, CustomRedisError>;

    /// Pop from the tail of a list, waiting up to `timeout`.
    async fn brpop(&self, list: String, timeout: Duration)
        -> Result<Option<String>, CustomRedisError>;

    async fn llen(&self, list: String) -> Result<u64, CustomRedisError>;

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError>;

    /// All members of a sorted set, lowest score first.
    async fn zrange(&self, k: String) -> Result<Vec<String>, CustomRedisError>;

    async fn get(&self, k: String) -> Result<String, CustomRedisError>;

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError>;

    /// Increment an integer scalar (missing counts as 0), returning the new value.
    async fn incr(&self, k: String) -> Result<i64, CustomRedisError>;

    /// Store a value and append an entry announcing it, in one transaction.
    async fn set_and_xadd(
        &self,
        k: String,
        v: String,
        log: String,
        fields: Vec<(String, String)>,
    ) -> Result<String, CustomRedisError>;
}

// Module declarations
mod client;
mod mock;
mod retry;

// Re-export public APIs
pub use client::{RedisClient, PUSH_ONCE_SCRIPT, TRIM_SCRIPT};
pub use mock::{MockRedisCall, MockRedisClient, MockRedisValue};
pub use retry::{RetryPolicy, RetryPolicyBuilder};

#[cfg(test)]
mod tests {
    use super::*;

    mod error_transience {
        use super::*;

        #[test]
        fn test_timeout_is_transient() {
            let err = CustomRedisError::Timeout;
            assert!(err.is_transient());
            assert!(!err.is_unrecoverable_error());
        }

        #[test]
        fn test_parse_error_is_unrecoverable() {
            let err = CustomRedisError::ParseError("invalid data".to_string());
            assert!(err.is_unrecoverable_error());
        }

        #[test]
        fn test_not_found_is_unrecoverable() {
            let err = CustomRedisError::NotFound;
            assert!(err.is_unrecoverable_error());
        }

        #[test]
        fn test_io_error_is_transient() {
            let err = CustomRedisError::from_redis_kind(
                redis::ErrorKind::IoError,
                "Connection refused",
            );
            assert!(err.is_transient());
            assert!(!matches!(err.retry_method(), RetryMethod::NoRetry));
        }

        #[test]
        fn test_server_reply_is_not_transient() {
            let err =
                CustomRedisError::from_redis_kind(redis::ErrorKind::TypeError, "WRONGTYPE");
            assert!(!err.is_transient());
            assert!(matches!(err.retry_method(), RetryMethod::NoRetry));
        }

        #[test]
        fn test_authentication_failed_is_unrecoverable() {
            let err = CustomRedisError::from_redis_kind(
                redis::ErrorKind::AuthenticationFailed,
                "WRONGPASS invalid username-password pair",
            );

            assert!(
                err.is_unrecoverable_error(),
                "AuthenticationFailed should be unrecoverable"
            );
            assert!(
                matches!(err.retry_method(), RetryMethod::NoRetry),
                "AuthenticationFailed should not be retried"
            );
        }
    }

    #[test]
    fn test_read_from_ids() {
        assert_eq!(ReadFrom::New.as_id(), ">");
        assert_eq!(ReadFrom::Pending.as_id(), "0");
        assert_eq!(ReadFrom::PendingAfter("7-0".to_string()).as_id(), "7-0");
    }

    #[test]
    fn test_log_append_capped() {
        let append = LogAppend::new("topic:science", vec![("data".into(), "{}".into())]);
        assert_eq!(append.max_len, None);
        assert_eq!(append.capped(10).max_len, Some(10));
    }
}
