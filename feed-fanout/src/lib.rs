pub mod config;
pub mod error;
pub mod fanout;
pub mod metrics_constants;
pub mod subscribers;
