use std::str::FromStr;
use std::time;

use common_redis::{CustomRedisError, RedisClient, RetryPolicy};
use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct RedisConfig {
    #[envconfig(default = "redis://localhost:6379/")]
    pub redis_url: String,

    // Every blocking read a stage issues is checked against this with `check_blocking`
    #[envconfig(default = "5000")]
    pub redis_response_timeout_ms: EnvMsDuration,

    #[envconfig(default = "5000")]
    pub redis_connection_timeout_ms: EnvMsDuration,
}

impl RedisConfig {
    /// Connect with the configured timeouts, waiting out an unavailable server with `retry_policy`.
    pub async fn connect(&self, retry_policy: RetryPolicy) -> Result<RedisClient, CustomRedisError> {
        RedisClient::with_config(
            self.redis_url.clone(),
            retry_policy,
            Some(self.redis_response_timeout_ms.0),
            Some(self.redis_connection_timeout_ms.0),
        )
        .await
    }

    /// A blocking read or pop must wait at least a millisecond, since the server reads zero
    /// as "block forever". It must also return before the response timeout gives up on it.
    pub fn check_blocking(&self, name: &str, block: time::Duration) -> Result<(), CustomRedisError> {
        if block < time::Duration::from_millis(1) {
            return Err(CustomRedisError::InvalidConfiguration(format!(
                "{name} must be at least 1ms, got {block:?}"
            )));
        }
        let response_timeout = self.redis_response_timeout_ms.0;
        if block >= response_timeout {
            return Err(CustomRedisError::InvalidConfiguration(format!(
                "{name} of {block:?} must be shorter than the redis response timeout of {response_timeout:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct RetryPolicyConfig {
    #[envconfig(default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(default = "250")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(default = "10000")]
    pub maximum_interval: EnvMsDuration,
}

impl RetryPolicyConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::build(self.backoff_coefficient, self.initial_interval.0)
            .maximum_interval(self.maximum_interval.0)
            .provide()
    }
}

/// How a stage reaches its scorer. Without a URL the built-in scorer is used.
#[derive(Envconfig, Clone, Debug)]
pub struct ScorerConfig {
    pub scorer_url: Option<NonEmptyString>,

    #[envconfig(default = "10000")]
    pub scorer_timeout: EnvMsDuration,

    #[envconfig(default = "3")]
    pub scorer_max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

/// Produce a host:port address for binding a TcpListener.
pub fn bind_address(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ms_duration_parsing() {
        assert_eq!(
            "1500".parse::<EnvMsDuration>(),
            Ok(EnvMsDuration(time::Duration::from_millis(1500)))
        );
        assert_eq!(
            "1.5".parse::<EnvMsDuration>(),
            Err(ParseEnvMsDurationError)
        );
    }

    #[test]
    fn test_non_empty_string() {
        assert_eq!("".parse::<NonEmptyString>(), Err(StringIsEmptyError));
        assert_eq!(
            "http://scorer".parse::<NonEmptyString>().map(|s| s.0),
            Ok("http://scorer".to_string())
        );
    }

    #[test]
    fn test_defaults_from_empty_env() {
        let env: HashMap<String, String> = HashMap::new();
        let redis = RedisConfig::init_from_hashmap(&env).unwrap();
        let retry = RetryPolicyConfig::init_from_hashmap(&env).unwrap();
        let scorer = ScorerConfig::init_from_hashmap(&env).unwrap();

        assert_eq!(redis.redis_url, "redis://localhost:6379/");
        assert_eq!(
            redis.redis_response_timeout_ms.0,
            time::Duration::from_secs(5)
        );
        assert_eq!(
            retry.policy().retry_interval(1),
            time::Duration::from_millis(250)
        );
        assert!(scorer.scorer_url.is_none());
        assert_eq!(scorer.scorer_max_attempts, 3);
    }

    #[test]
    fn test_blocking_reads_must_fit_in_the_response_timeout() {
        let env: HashMap<String, String> =
            HashMap::from([("REDIS_RESPONSE_TIMEOUT_MS".to_string(), "2000".to_string())]);
        let redis = RedisConfig::init_from_hashmap(&env).unwrap();

        assert!(redis
            .check_blocking("read_block", time::Duration::from_millis(500))
            .is_ok());
        assert!(matches!(
            redis.check_blocking("pop_timeout", time::Duration::ZERO),
            Err(CustomRedisError::InvalidConfiguration(msg)) if msg.contains("pop_timeout")
        ));
        assert!(redis
            .check_blocking("read_block", time::Duration::from_micros(500))
            .is_err());
        assert!(redis
            .check_blocking("read_block", time::Duration::from_millis(2000))
            .is_err());
    }

    #[test]
    fn test_retry_policy_from_env() {
        let env: HashMap<String, String> = [
            ("BACKOFF_COEFFICIENT", "3"),
            ("INITIAL_INTERVAL", "100"),
            ("MAXIMUM_INTERVAL", "500"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let policy = RetryPolicyConfig::init_from_hashmap(&env).unwrap().policy();

        assert_eq!(policy.retry_interval(2), time::Duration::from_millis(300));
        assert_eq!(policy.retry_interval(3), time::Duration::from_millis(500));
    }
}
