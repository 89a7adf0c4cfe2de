//! Many workers contending for one lock
//!
//! Each worker acquires `lock_key`, holds it for the configured time,
//! releases, then acquires and releases it once more. The report counts
//! overlapping holders, which must stay zero.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::future::join_all;
use keylock_core::{CallerContext, LockCoordinator, LockRequest, ReleaseOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::DemoConfig;

pub const CONTENTION_LOCK_NAME: &str = "lock_key";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentionReport {
    pub workers: usize,
    pub acquired: usize,
    pub failed: usize,
    pub reacquired: usize,
    /// Times a worker entered the critical section while another was inside
    pub overlaps: usize,
    pub mismatched_releases: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    acquired: bool,
    reacquired: bool,
    mismatches: usize,
}

#[derive(Clone)]
pub struct ContentionDemo {
    coordinator: Arc<LockCoordinator>,
    config: DemoConfig,
}

impl ContentionDemo {
    pub fn new(coordinator: Arc<LockCoordinator>, config: DemoConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn default_workers(&self) -> usize {
        self.config.workers
    }

    fn request(&self) -> LockRequest {
        LockRequest::new(CONTENTION_LOCK_NAME)
            .with_ttl(self.config.lock_ttl)
            .with_max_retries(self.config.max_retries)
    }

    /// Run `workers` concurrent workers and wait for all of them
    pub async fn run(&self, workers: usize) -> ContentionReport {
        let started = Instant::now();
        let in_flight = AtomicUsize::new(0);
        let overlaps = AtomicUsize::new(0);

        let outcomes = join_all((0..workers).map(|id| self.worker(id, &in_flight, &overlaps))).await;

        let report = ContentionReport {
            workers,
            acquired: outcomes.iter().filter(|o| o.acquired).count(),
            failed: outcomes.iter().filter(|o| !o.acquired).count(),
            reacquired: outcomes.iter().filter(|o| o.reacquired).count(),
            overlaps: overlaps.load(Ordering::SeqCst),
            mismatched_releases: outcomes.iter().map(|o| o.mismatches).sum(),
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(?report, "Contention demo finished");
        report
    }

    async fn worker(&self, id: usize, in_flight: &AtomicUsize, overlaps: &AtomicUsize) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::default();
        let request = self.request();

        debug!(worker = id, "Worker trying to acquire lock");
        let context = CallerContext::named(format!("demo-worker-{}", id));
        let handle = match self.coordinator.acquire(&context, &request).await {
            Ok(handle) => handle,
            Err(e) => {
                info!(worker = id, error = %e, "Worker gave up on lock");
                return outcome;
            }
        };
        outcome.acquired = true;
        info!(worker = id, token = %handle.token(), "Worker acquired lock, running task");

        if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            overlaps.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(self.config.hold).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);

        outcome.mismatches += self.release(id, self.coordinator.release(handle).await);

        // Second round with a fresh context
        let context = CallerContext::named(format!("demo-worker-{}-again", id));
        match self.coordinator.acquire(&context, &request).await {
            Ok(handle) => {
                outcome.reacquired = true;
                debug!(worker = id, "Worker acquired lock again");
                outcome.mismatches += self.release(id, self.coordinator.release(handle).await);
            }
            Err(e) => {
                info!(worker = id, error = %e, "Worker could not acquire lock again");
            }
        }

        outcome
    }

    fn release(&self, id: usize, result: keylock_core::LockResult<ReleaseOutcome>) -> usize {
        match result {
            Ok(ReleaseOutcome::Mismatch) => 1,
            Ok(_) => {
                debug!(worker = id, "Worker released lock");
                0
            }
            Err(e) => {
                warn!(worker = id, error = %e, "Worker failed to release lock");
                0
            }
        }
    }
}
