use envconfig::Envconfig;
use feed_common::config::{
    bind_address, EnvMsDuration, NonEmptyString, RedisConfig, RetryPolicyConfig,
};

use crate::error::IngestError;
use crate::source::{CsvSource, DocumentSource, SyntheticSource};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "9114")]
    pub port: u16,

    // Documents per second
    #[envconfig(from = "REPLAY_RATE", default = "250")]
    pub rate: f64,

    #[envconfig(from = "REPLAY_FILE")]
    pub replay_file: Option<NonEmptyString>,

    #[envconfig(from = "REPLAY_LOOP", default = "false")]
    pub replay_loop: bool,

    #[envconfig(from = "SYNTHETIC_CORPUS", default = "200")]
    pub synthetic_corpus: usize,

    // Defaults to the current time in milliseconds, so restarts do not reuse ids
    #[envconfig(from = "FIRST_DOCUMENT_ID")]
    pub first_id: Option<u64>,

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

    /// The replay file when one is configured, the synthetic corpus otherwise.
    pub fn source(&self) -> Result<Box<dyn DocumentSource>, IngestError> {
        Ok(match &self.replay_file {
            Some(path) => Box::new(CsvSource::open(path.as_str(), self.replay_loop)?),
            None => Box::new(SyntheticSource::new(self.synthetic_corpus)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_synthetic_by_default() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.rate, 250.0);
        assert!(config.replay_file.is_none());

        let mut source = config.source().unwrap();
        assert!(source.next_article().is_some());
    }

    #[test]
    fn test_missing_replay_file_fails() {
        let env = HashMap::from([(
            "REPLAY_FILE".to_string(),
            "/nonexistent/news.csv".to_string(),
        )]);
        let config = Config::init_from_hashmap(&env).unwrap();
        assert!(config.source().is_err());
    }
}
