pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics_constants;
pub mod source;
