use common_redis::CustomRedisError;
use envconfig::Envconfig;
use feed_common::config::{bind_address, EnvMsDuration, RedisConfig, RetryPolicyConfig};

use crate::error::ReaderError;
use crate::rate::RatePolicy;
use crate::reader::ReaderSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9112")]
    pub port: u16,

    // Fixed reads per second, ignoring the population
    #[envconfig(from = "READER_RPS")]
    pub fixed_rate: Option<f64>,

    #[envconfig(from = "READER_MIN_RPS", default = "1.0")]
    pub min_rate: f64,

    #[envconfig(from = "READER_MAX_RPS", default = "200.0")]
    pub max_rate: f64,

    #[envconfig(from = "READER_PER_SUBSCRIBER_RPS", default = "0.5")]
    pub per_subscriber_rate: f64,

    #[envconfig(default = "1000")]
    pub pop_timeout: EnvMsDuration,

    #[envconfig(default = "1000")]
    pub population_refresh: EnvMsDuration,

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
        self.redis.check_blocking("pop_timeout", self.pop_timeout.0)
    }

    pub fn rate_policy(&self) -> Result<RatePolicy, ReaderError> {
        RatePolicy::new(
            self.min_rate,
            self.max_rate,
            self.per_subscriber_rate,
            self.fixed_rate,
        )
    }

    pub fn settings(&self) -> ReaderSettings {
        ReaderSettings {
            pop_timeout: self.pop_timeout.0,
            population_refresh: self.population_refresh.0,
        }
    }
}
