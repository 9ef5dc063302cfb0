use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamReadReply;
use redis::{FromRedisValue, RedisResult};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{Client, CustomRedisError, FeedPush, LogAppend, ReadFrom, RetryPolicy, StreamEntry};

/// Trims a log server-side so the length check and the removal happen in one step.
pub const TRIM_SCRIPT: &str = "return redis.call('XTRIM', KEYS[1], 'MAXLEN', tonumber(ARGV[1]))";

/// Pushes to a feed only when the member is new in the seen-set. Returns -1 for a member
/// already seen, otherwise the capped list length.
///
/// KEYS: seen-set, feed list, tail log. ARGV: member, ttl seconds, payload, cap.
pub const PUSH_ONCE_SCRIPT: &str = r#"
if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
  return -1
end
redis.call('EXPIRE', KEYS[1], ARGV[2], 'NX')
local cap = tonumber(ARGV[4])
local len = redis.call('LPUSH', KEYS[2], ARGV[3])
redis.call('LTRIM', KEYS[2], 0, cap - 1)
redis.call('XADD', KEYS[3], 'MAXLEN', '=', cap, '*', 'data', ARGV[3])
return math.min(len, cap)
"#;

/// Run `op` until it succeeds or fails with an error that is not transient.
///
/// Every transient failure sleeps the policy's backoff for that attempt, then `reconnect`
/// runs. `op` gets the number of failures so far. With `max_retries` set, a transient error
/// is returned once that many retries are spent (after the reconnect), otherwise attempts
/// never stop.
pub(crate) async fn retry_transient<T, Op, OpFut, Re, ReFut>(
    retry_policy: &RetryPolicy,
    max_retries: Option<u32>,
    mut op: Op,
    mut reconnect: Re,
) -> Result<T, CustomRedisError>
where
    Op: FnMut(u32) -> OpFut,
    OpFut: Future<Output = Result<T, CustomRedisError>>,
    Re: FnMut() -> ReFut,
    ReFut: Future<Output = ()>,
{
    let mut attempt = 0;
    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => err,
        };

        attempt += 1;
        let backoff = retry_policy.retry_interval(attempt);
        warn!(
            error = %err,
            attempt,
            "redis command failed, reconnecting in {:?}",
            backoff
        );
        metrics::counter!("redis_reconnect_attempts_total").increment(1);
        tokio::time::sleep(backoff).await;
        reconnect().await;

        if max_retries.is_some_and(|max| attempt > max) {
            return Err(err);
        }
    }
}

/// A redis client owning one multiplexed connection.
///
/// Transient failures (I/O, timeouts, a server still loading) sleep according to the retry
/// policy and replace the connection. Commands are then run again, for as long as it takes,
/// except reads of new group entries which report the failure after reconnecting. Consumer
/// groups live on the server, so a fresh connection resumes exactly where the previous one
/// stopped.
pub struct RedisClient {
    client: redis::Client,
    connection: RwLock<MultiplexedConnection>,
    retry_policy: RetryPolicy,
    response_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
    trim_script: redis::Script,
    push_once_script: redis::Script,
}

impl RedisClient {
    /// Create a new RedisClient with the default retry policy and no timeouts.
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        Self::with_config(addr, RetryPolicy::default(), None, None).await
    }

    /// Create a new RedisClient with full configuration control
    ///
    /// # Arguments
    /// * `addr` - Redis connection string
    /// * `retry_policy` - Backoff used while the server is unreachable
    /// * `response_timeout` - Optional timeout for command responses. Must be longer than any
    ///   blocking read issued through this client. `None` means no timeout.
    /// * `connection_timeout` - Optional timeout for establishing connections.
    ///
    /// # Errors
    /// Returns `CustomRedisError::InvalidConfiguration` if `Some(Duration::ZERO)` is passed - use `None` for no timeout instead.
    pub async fn with_config(
        addr: String,
        retry_policy: RetryPolicy,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;

        if let Some(timeout) = response_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis response timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }
        if let Some(timeout) = connection_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis connection timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }

        let connection_config = connection_config(response_timeout, connection_timeout);
        let (redis_client, config) = (&client, &connection_config);
        let connection = retry_transient(
            &retry_policy,
            None,
            |_| async move {
                redis_client
                    .get_multiplexed_async_connection_with_config(config)
                    .await
                    .map_err(CustomRedisError::from)
            },
            || async {},
        )
        .await?;
        info!("connected to redis");

        Ok(RedisClient {
            client,
            connection: RwLock::new(connection),
            retry_policy,
            response_timeout,
            connection_timeout,
            trim_script: redis::Script::new(TRIM_SCRIPT),
            push_once_script: redis::Script::new(PUSH_ONCE_SCRIPT),
        })
    }

    /// Replace the current connection with a fresh one.
    pub async fn reconnect(&self) -> Result<(), CustomRedisError> {
        let config = connection_config(self.response_timeout, self.connection_timeout);
        let connection = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;
        *self.connection.write().await = connection;
        info!("reconnected to redis");
        Ok(())
    }

    async fn reconnect_or_warn(&self) {
        if let Err(err) = self.reconnect().await {
            warn!(error = %err, "failed to reconnect to redis");
        }
    }

    async fn connection(&self) -> MultiplexedConnection {
        self.connection.read().await.clone()
    }

    async fn query_cmd<T: FromRedisValue + Send>(
        &self,
        cmd: &redis::Cmd,
    ) -> Result<T, CustomRedisError> {
        retry_transient(
            &self.retry_policy,
            None,
            |_| async move {
                let mut conn = self.connection().await;
                let result: RedisResult<T> = cmd.query_async(&mut conn).await;
                result.map_err(CustomRedisError::from)
            },
            || self.reconnect_or_warn(),
        )
        .await
    }

    async fn query_pipe<T: FromRedisValue + Send>(
        &self,
        pipe: &redis::Pipeline,
    ) -> Result<T, CustomRedisError> {
        retry_transient(
            &self.retry_policy,
            None,
            |_| async move {
                let mut conn = self.connection().await;
                let result: RedisResult<T> = pipe.query_async(&mut conn).await;
                result.map_err(CustomRedisError::from)
            },
            || self.reconnect_or_warn(),
        )
        .await
    }
}

fn connection_config(
    response_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
) -> redis::AsyncConnectionConfig {
    let mut config = redis::AsyncConnectionConfig::new();
    if let Some(timeout) = response_timeout {
        config = config.set_response_timeout(timeout);
    }
    if let Some(timeout) = connection_timeout {
        config = config.set_connection_timeout(timeout);
    }
    config
}

fn xadd_cmd(
    cmd: &mut redis::Cmd,
    log: &str,
    max_len: Option<usize>,
    fields: &[(String, String)],
) {
    cmd.arg(log);
    if let Some(max_len) = max_len {
        cmd.arg("MAXLEN").arg("=").arg(max_len);
    }
    cmd.arg("*");
    for (field, value) in fields {
        cmd.arg(field).arg(value);
    }
}

fn parse_read_reply(reply: Option<StreamReadReply>) -> Result<Vec<StreamEntry>, CustomRedisError> {
    let Some(reply) = reply else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for key in reply.keys {
        for stream_id in key.ids {
            let mut fields = HashMap::with_capacity(stream_id.map.len());
            for (field, value) in stream_id.map.iter() {
                let value: String = redis::from_redis_value(value)
                    .map_err(|e| CustomRedisError::ParseError(e.to_string()))?;
                fields.insert(field.clone(), value);
            }
            entries.push(StreamEntry {
                id: stream_id.id,
                fields,
            });
        }
    }
    Ok(entries)
}

#[async_trait]
impl Client for RedisClient {
    async fn xadd(
        &self,
        log: String,
        fields: Vec<(String, String)>,
    ) -> Result<String, CustomRedisError> {
        let mut cmd = redis::cmd("XADD");
        xadd_cmd(&mut cmd, &log, None, &fields);
        self.query_cmd(&cmd).await
    }

    async fn publish_batch(
        &self,
        appends: Vec<LogAppend>,
    ) -> Result<Vec<String>, CustomRedisError> {
        if appends.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for append in &appends {
            let mut cmd = redis::cmd("XADD");
            xadd_cmd(&mut cmd, &append.log, append.max_len, &append.fields);
            pipe.add_command(cmd);
        }
        self.query_pipe(&pipe).await
    }

    async fn xgroup_create(
        &self,
        log: String,
        group: String,
        start_id: String,
    ) -> Result<(), CustomRedisError> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(&log).arg(&group).arg(&start_id).arg("MKSTREAM");
        match self.query_cmd::<()>(&cmd).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_busy_group() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn xreadgroup(
        &self,
        log: String,
        group: String,
        consumer: String,
        from: ReadFrom,
        count: usize,
        block: Option<Duration>,
    ) -> Result<Vec<StreamEntry>, CustomRedisError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(&group).arg(&consumer).arg("COUNT").arg(count);
        // Pending entries are already ours, never wait on them
        if let (Some(block), ReadFrom::New) = (block, &from) {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(&log).arg(from.as_id());

        // Re-sending `>` after a lost reply would skip whatever that reply carried
        let max_retries = match from {
            ReadFrom::New => Some(0),
            ReadFrom::Pending | ReadFrom::PendingAfter(_) => None,
        };
        let cmd = &cmd;
        let reply: Option<StreamReadReply> = retry_transient(
            &self.retry_policy,
            max_retries,
            |_| async move {
                let mut conn = self.connection().await;
                let result: RedisResult<Option<StreamReadReply>> = cmd.query_async(&mut conn).await;
                result.map_err(CustomRedisError::from)
            },
            || self.reconnect_or_warn(),
        )
        .await?;
        parse_read_reply(reply)
    }

    async fn xack(
        &self,
        log: String,
        group: String,
        ids: Vec<String>,
    ) -> Result<u64, CustomRedisError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("XACK");
        cmd.arg(&log).arg(&group).arg(&ids);
        self.query_cmd(&cmd).await
    }

    async fn xtrim(&self, log: String, max_len: usize) -> Result<u64, CustomRedisError> {
        let mut cmd = redis::cmd("XTRIM");
        cmd.arg(&log).arg("MAXLEN").arg(max_len);
        self.query_cmd(&cmd).await
    }

    async fn atomic_trim(&self, log: String, max_len: usize) -> Result<u64, CustomRedisError> {
        let log = &log;
        retry_transient(
            &self.retry_policy,
            None,
            |_| async move {
                let mut conn = self.connection().await;
                let result: RedisResult<u64> = self
                    .trim_script
                    .key(log)
                    .arg(max_len)
                    .invoke_async(&mut conn)
                    .await;
                result.map_err(CustomRedisError::from)
            },
            || self.reconnect_or_warn(),
        )
        .await
    }

    async fn xlen(&self, log: String) -> Result<u64, CustomRedisError> {
        let mut cmd = redis::cmd("XLEN");
        cmd.arg(&log);
        self.query_cmd(&cmd).await
    }

    async fn sadd_expire_nx(
        &self,
        set: String,
        member: String,
        ttl_seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SADD").arg(&set).arg(&member);
        pipe.cmd("EXPIRE")
            .arg(&set)
            .arg(ttl_seconds)
            .arg("NX")
            .ignore();

        let (added,): (u64,) = self.query_pipe(&pipe).await?;
        Ok(added == 1)
    }

    async fn push_to_feed(
        &self,
        list: String,
        tail_log: String,
        payload: String,
        cap: usize,
    ) -> Result<u64, CustomRedisError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("LPUSH").arg(&list).arg(&payload);
        pipe.cmd("LTRIM")
            .arg(&list)
            .arg(0)
            .arg(cap.saturating_sub(1))
            .ignore();
        let mut xadd = redis::cmd("XADD");
        xadd_cmd(&mut xadd, &tail_log, Some(cap), &[("data".to_string(), payload)]);
        pipe.add_command(xadd).ignore();

        let (pushed_len,): (u64,) = self.query_pipe(&pipe).await?;
        Ok(pushed_len.min(cap as u64))
    }

    async fn push_to_feed_once(
        &self,
        seen_set: String,
        member: String,
        ttl_seconds: u64,
        push: FeedPush,
    ) -> Result<Option<u64>, CustomRedisError> {
        let (seen_set, member, push) = (&seen_set, &member, &push);
        let pushed_len: i64 = retry_transient(
            &self.retry_policy,
            None,
            |_| async move {
                let mut conn = self.connection().await;
                let result: RedisResult<i64> = self
                    .push_once_script
                    .key(seen_set)
                    .key(&push.list)
                    .key(&push.tail_log)
                    .arg(member)
                    .arg(ttl_seconds)
                    .arg(&push.payload)
                    .arg(push.cap)
                    .invoke_async(&mut conn)
                    .await;
                result.map_err(CustomRedisError::from)
            },
            || self.reconnect_or_warn(),
        )
        .await?;

        Ok(u64::try_from(pushed_len).ok())
    }

    async fn brpop(
        &self,
        list: String,
        timeout: Duration,
    ) -> Result<Option<String>, CustomRedisError> {
        let mut cmd = redis::cmd("BRPOP");
        cmd.arg(&list).arg(timeout.as_secs_f64());
        let popped: Option<(String, String)> = self.query_cmd(&cmd).await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn llen(&self, list: String) -> Result<u64, CustomRedisError> {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(&list);
        self.query_cmd(&cmd).await
    }

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(&k).arg(score).arg(&member);
        self.query_cmd::<u64>(&cmd).await?;
        Ok(())
    }

    async fn zrange(&self, k: String) -> Result<Vec<String>, CustomRedisError> {
        let mut cmd = redis::cmd("ZRANGE");
        cmd.arg(&k).arg(0).arg(-1);
        self.query_cmd(&cmd).await
    }

    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(&k);
        let value: Option<String> = self.query_cmd(&cmd).await?;
        value.ok_or(CustomRedisError::NotFound)
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(&k).arg(&v);
        self.query_cmd::<()>(&cmd).await
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(&k);
        self.query_cmd(&cmd).await
    }

    async fn set_and_xadd(
        &self,
        k: String,
        v: String,
        log: String,
        fields: Vec<(String, String)>,
    ) -> Result<String, CustomRedisError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET").arg(&k).arg(&v).ignore();
        let mut xadd = redis::cmd("XADD");
        xadd_cmd(&mut xadd, &log, None, &fields);
        pipe.add_command(xadd);

        let (id,): (String,) = self.query_pipe(&pipe).await?;
        Ok(id)
    }
}
