use std::time::Duration;

use common_redis::CustomRedisError;
use envconfig::Envconfig;
use feed_common::config::{
    bind_address, EnvMsDuration, NonEmptyString, RedisConfig, RetryPolicyConfig,
};

use crate::fanout::FanoutSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9111")]
    pub port: u16,

    #[envconfig(default = "fanout-1")]
    pub consumer_name: NonEmptyString,

    #[envconfig(from = "FEED_LEN", default = "100")]
    pub feed_len: usize,

    #[envconfig(from = "TOPIC_MAXLEN", default = "10000")]
    pub topic_max_len: usize,

    #[envconfig(from = "SUBSCRIBER_CACHE_TTL", default = "1000")]
    pub subscriber_cache_ttl: EnvMsDuration,

    #[envconfig(from = "SEEN_TTL", default = "86400")]
    pub seen_ttl_secs: u64,

    #[envconfig(default = "64")]
    pub read_count: usize,

    // Short, since one blocking read per topic adds up over a round
    #[envconfig(default = "50")]
    pub read_block: EnvMsDuration,

    #[envconfig(default = "20")]
    pub round_sleep: EnvMsDuration,

    #[envconfig(default = "60000")]
    pub liveness_deadline: EnvMsDuration,

    #[envconfig(nested = true)]
    pub redis: RedisConfig,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        bind_address(&self.host, self.port)
    }

    /// Reject settings the log service would turn into endless waits.
    pub fn validate(&self) -> Result<(), CustomRedisError> {
        self.redis.check_blocking("read_block", self.read_block.0)
    }

    pub fn settings(&self) -> FanoutSettings {
        FanoutSettings {
            consumer_name: self.consumer_name.as_str().to_string(),
            feed_len: self.feed_len,
            topic_max_len: self.topic_max_len,
            subscriber_cache_ttl: self.subscriber_cache_ttl.0,
            seen_ttl: Duration::from_secs(self.seen_ttl_secs),
            read_count: self.read_count,
            read_block: self.read_block.0,
            round_sleep: self.round_sleep.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        let settings = config.settings();

        assert_eq!(config.bind(), "0.0.0.0:9111");
        assert_eq!(settings.feed_len, 100);
        assert_eq!(settings.seen_ttl, Duration::from_secs(86400));
        assert_eq!(settings.subscriber_cache_ttl, Duration::from_millis(1000));
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            ("FEED_LEN".to_string(), "5".to_string()),
            ("SEEN_TTL".to_string(), "60".to_string()),
        ]);
        let settings = Config::init_from_hashmap(&env).unwrap().settings();

        assert_eq!(settings.feed_len, 5);
        assert_eq!(settings.seen_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_read_block_is_checked_against_response_timeout() {
        let zero = HashMap::from([("READ_BLOCK".to_string(), "0".to_string())]);
        assert!(Config::init_from_hashmap(&zero).unwrap().validate().is_err());

        let too_long = HashMap::from([
            ("READ_BLOCK".to_string(), "5000".to_string()),
            ("REDIS_RESPONSE_TIMEOUT_MS".to_string(), "5000".to_string()),
        ]);
        assert!(Config::init_from_hashmap(&too_long).unwrap().validate().is_err());

        assert!(Config::init_from_hashmap(&HashMap::new())
            .unwrap()
            .validate()
            .is_ok());
    }
}
