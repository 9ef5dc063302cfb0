//! Shared building blocks of the news feed pipeline stages: the documents flowing through
//! the logs, the key layout, configuration types, scorers, the seen-set and the consume
//! loop plumbing.

pub mod config;
pub mod document;
pub mod keys;
pub mod scorer;
pub mod seen;
pub mod stage;
pub mod topic;
