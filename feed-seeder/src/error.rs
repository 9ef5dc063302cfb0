use common_redis::CustomRedisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeederError {
    #[error("log service error: {0}")]
    Redis(#[from] CustomRedisError),
    #[error("failed to serialize a profile: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("subscriber sequence returned {0}")]
    InvalidSequence(i64),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
