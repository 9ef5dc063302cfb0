use common_redis::CustomRedisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("log service error: {0}")]
    Redis(#[from] CustomRedisError),
    #[error("failed to serialize a document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
