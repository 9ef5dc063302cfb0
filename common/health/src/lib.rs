//! Liveness of the consume loops of a stage process.
//!
//! Each loop registers once with a deadline and checks in after every iteration. A loop that
//! goes longer than its deadline without checking in (for example stuck on a dead connection)
//! is stalled, and a single stalled loop fails the liveness check of the whole process.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// Registered, first iteration still running
    Starting,
    /// Checked in within its deadline
    Healthy,
    /// Missed its deadline, either since registering or since the last check-in
    Stalled,
}

#[derive(Debug, Clone, Copy)]
struct LoopClock {
    deadline: Duration,
    registered_at: Instant,
    checked_in_at: Option<Instant>,
}

impl LoopClock {
    fn status(&self, now: Instant) -> LoopStatus {
        let since = self.checked_in_at.unwrap_or(self.registered_at);
        if now.saturating_duration_since(since) > self.deadline {
            return LoopStatus::Stalled;
        }
        match self.checked_in_at {
            Some(_) => LoopStatus::Healthy,
            None => LoopStatus::Starting,
        }
    }
}

type Loops = Arc<RwLock<BTreeMap<String, LoopClock>>>;

fn read_loops(loops: &Loops) -> RwLockReadGuard<'_, BTreeMap<String, LoopClock>> {
    match loops.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_loops(loops: &Loops) -> RwLockWriteGuard<'_, BTreeMap<String, LoopClock>> {
    match loops.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// What `/_liveness` answers: 200 when every loop is healthy, 503 otherwise.
#[derive(Debug, Default)]
pub struct HealthStatus {
    pub healthy: bool,
    pub loops: BTreeMap<String, LoopStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let mut body = String::new();
        for (name, status) in &self.loops {
            body.push_str(&format!("{name}: {status:?}\n"));
        }
        let code = match self.healthy {
            true => StatusCode::OK,
            false => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, body).into_response()
    }
}

/// Given to one loop, which calls `report_healthy` after each iteration.
#[derive(Clone)]
pub struct HealthHandle {
    name: String,
    loops: Loops,
}

impl HealthHandle {
    pub async fn report_healthy(&self) {
        if let Some(clock) = write_loops(&self.loops).get_mut(&self.name) {
            clock.checked_in_at = Some(Instant::now());
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    loops: Loops,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            loops: Default::default(),
        }
    }

    /// Start tracking a loop that must check in at least every `deadline`. Registering a name
    /// again restarts its clock.
    pub async fn register(&self, name: String, deadline: Duration) -> HealthHandle {
        write_loops(&self.loops).insert(
            name.clone(),
            LoopClock {
                deadline,
                registered_at: Instant::now(),
                checked_in_at: None,
            },
        );
        HealthHandle {
            name,
            loops: self.loops.clone(),
        }
    }

    /// Status of every registered loop. The process is healthy only when there is at least
    /// one loop and all of them are. Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let now = Instant::now();
        let loops: BTreeMap<String, LoopStatus> = read_loops(&self.loops)
            .iter()
            .map(|(name, clock)| (name.clone(), clock.status(now)))
            .collect();
        let healthy = !loops.is_empty() && loops.values().all(|s| *s == LoopStatus::Healthy);

        match healthy {
            true => debug!("{} check ok", self.name),
            false => warn!("{} check failed: {:?}", self.name, loops),
        }
        HealthStatus { healthy, loops }
    }
}
