use envconfig::Envconfig;
use feed_common::config::{bind_address, EnvMsDuration, RedisConfig, RetryPolicyConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9113")]
    pub port: u16,

    // Subscribers per second
    #[envconfig(from = "SEED_RATE", default = "0.5")]
    pub rate: f64,

    // Stop after this many subscribers, seed forever when unset
    #[envconfig(from = "SEED_LIMIT")]
    pub limit: Option<u64>,

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
}
