pub mod config;
pub mod error;
pub mod metrics_constants;
pub mod sentiment;
