use common_redis::CustomRedisError;
use envconfig::Envconfig;
use feed_common::config::{
    bind_address, EnvMsDuration, NonEmptyString, RedisConfig, RetryPolicyConfig, ScorerConfig,
};

use crate::enricher::EnricherSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9110")]
    pub port: u16,

    #[envconfig(default = "enrich-1")]
    pub consumer_name: NonEmptyString,

    #[envconfig(from = "ENRICH_BATCH", default = "32")]
    pub batch_size: usize,

    #[envconfig(default = "500")]
    pub read_block: EnvMsDuration,

    // A partial batch older than this is scored anyway
    #[envconfig(default = "2000")]
    pub batch_max_wait: EnvMsDuration,

    #[envconfig(from = "NEWS_RAW_MAXLEN", default = "5000")]
    pub raw_max_len: usize,

    #[envconfig(from = "TOPIC_MAXLEN", default = "10000")]
    pub topic_max_len: usize,

    #[envconfig(from = "NEWS_CLS_MAXLEN", default = "10000")]
    pub enriched_max_len: usize,

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

    pub fn settings(&self) -> EnricherSettings {
        EnricherSettings {
            consumer_name: self.consumer_name.as_str().to_string(),
            batch_size: self.batch_size,
            read_block: self.read_block.0,
            batch_max_wait: self.batch_max_wait.0,
            raw_max_len: self.raw_max_len,
            topic_max_len: self.topic_max_len,
            enriched_max_len: self.enriched_max_len,
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
