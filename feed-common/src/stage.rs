use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use common_redis::{Client, CustomRedisError, ReadFrom, StreamEntry};
use health::HealthRegistry;
use tracing::{info, warn};

/// One consumer of one consumer group.
///
/// After a restart the consumer first drains the entries it was handed before but never
/// acknowledged, then moves on to entries nobody has seen. A read of new entries that fails
/// midway may still have handed entries over, so the consumer goes back to its pending
/// entries above the last one it returned.
pub struct GroupConsumer {
    client: Arc<dyn Client + Send + Sync>,
    log: String,
    group: String,
    consumer: String,
    from: ReadFrom,
    last_returned: Option<String>,
}

impl GroupConsumer {
    /// Create the group if needed, starting from the beginning of the log.
    pub async fn join(
        client: Arc<dyn Client + Send + Sync>,
        log: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, CustomRedisError> {
        client
            .xgroup_create(log.to_string(), group.to_string(), "0".to_string())
            .await?;

        Ok(Self {
            client,
            log: log.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            from: ReadFrom::Pending,
            last_returned: None,
        })
    }

    pub fn is_replaying(&self) -> bool {
        self.from != ReadFrom::New
    }

    /// Up to `count` entries, waiting at most `block` when there is nothing new.
    ///
    /// Each pending entry is returned once per consumer lifetime. A transient failure of a new
    /// read yields an empty batch and switches back to pending entries.
    pub async fn read(
        &mut self,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, CustomRedisError> {
        if self.is_replaying() {
            let pending = self
                .client
                .xreadgroup(
                    self.log.clone(),
                    self.group.clone(),
                    self.consumer.clone(),
                    self.from.clone(),
                    count,
                    None,
                )
                .await?;
            if let Some(last) = pending.last() {
                info!(
                    log = %self.log,
                    group = %self.group,
                    count = pending.len(),
                    "replaying unacknowledged entries"
                );
                self.from = ReadFrom::PendingAfter(last.id.clone());
                self.last_returned = Some(last.id.clone());
                return Ok(pending);
            }
            self.from = ReadFrom::New;
        }

        let read = self
            .client
            .xreadgroup(
                self.log.clone(),
                self.group.clone(),
                self.consumer.clone(),
                ReadFrom::New,
                count,
                Some(block),
            )
            .await;
        match read {
            Ok(entries) => {
                if let Some(last) = entries.last() {
                    self.last_returned = Some(last.id.clone());
                }
                Ok(entries)
            }
            Err(err) if err.is_transient() => {
                warn!(
                    log = %self.log,
                    group = %self.group,
                    error = %err,
                    "read of new entries failed, resuming from pending entries"
                );
                self.from = match &self.last_returned {
                    Some(id) => ReadFrom::PendingAfter(id.clone()),
                    None => ReadFrom::Pending,
                };
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn ack(&self, ids: Vec<String>) -> Result<u64, CustomRedisError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.client
            .xack(self.log.clone(), self.group.clone(), ids)
            .await
    }
}

/// Health routes every stage serves next to `/metrics`.
pub fn router(liveness: HealthRegistry, name: &'static str) -> Router {
    Router::new()
        .route("/", get(move || ready(name)))
        .route("/_readiness", get(move || ready(name)))
        .route("/_liveness", get(move || ready(liveness.get_status())))
}
