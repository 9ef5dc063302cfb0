use common_redis::CustomRedisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("log service error: {0}")]
    Redis(#[from] CustomRedisError),
    #[error("invalid subscriber population {0:?}")]
    InvalidPopulation(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
