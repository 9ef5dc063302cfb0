use common_redis::CustomRedisError;
use envconfig::Envconfig;
use feed_common::config::{
    bind_address, EnvMsDuration, NonEmptyString, RedisConfig, RetryPolicyConfig,
};

use crate::aggregator::AggregatorSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9103")]
    pub port: u16,

    #[envconfig(default = "agg-1")]
    pub consumer_name: NonEmptyString,

    #[envconfig(from = "AGG_WINDOW_SECS", default = "60")]
    pub window_secs: u64,

    #[envconfig(default = "256")]
    pub read_count: usize,

    // Bounds how late past a window boundary the flush can happen
    #[envconfig(default = "1000")]
    pub read_block: EnvMsDuration,

    #[envconfig(default = "30000")]
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

    pub fn settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            consumer_name: self.consumer_name.as_str().to_string(),
            window_secs: self.window_secs,
            read_count: self.read_count,
            read_block: self.read_block.0,
        }
    }
}
