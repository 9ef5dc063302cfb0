use common_redis::CustomRedisError;
use envconfig::Envconfig;
use feed_common::config::{
    bind_address, EnvMsDuration, NonEmptyString, RedisConfig, RetryPolicyConfig, ScorerConfig,
};

use crate::sentiment::SentimentSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9102")]
    pub port: u16,

    #[envconfig(default = "sent-1")]
    pub consumer_name: NonEmptyString,

    #[envconfig(default = "32")]
    pub read_count: usize,

    #[envconfig(default = "1000")]
    pub read_block: EnvMsDuration,

    #[envconfig(from = "NEWS_PROC_MAXLEN", default = "10000")]
    pub processed_max_len: usize,

    #[envconfig(default = "60000")]
    pub liveness_deadline: EnvMsDuration,

    #[envconfig(nested = true)]
    pub redis: RedisConfig,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,

    #[envconfig(nested = true)]
    pub scorer: ScorerConfig,
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

    pub fn settings(&self) -> SentimentSettings {
        SentimentSettings {
            consumer_name: self.consumer_name.as_str().to_string(),
            read_count: self.read_count,
            read_block: self.read_block.0,
            processed_max_len: self.processed_max_len,
            scorer_max_attempts: self.scorer.scorer_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

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
