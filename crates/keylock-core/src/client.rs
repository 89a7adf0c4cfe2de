//! Store-facing half of the protocol: acquire with bounded retry, release, renew
//!
//! A fresh [`IdentityToken`] is generated once per `acquire_with_retry` call
//! and reused for every attempt of that call. Reuse is safe because a
//! refused `acquire_if_absent` leaves the store untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::LockResult;
use crate::metrics;
use crate::model::{IdentityToken, LockKey};
use crate::store::LockStore;

/// Outcome of an acquisition attempt sequence
///
/// Failure to acquire is an expected condition, so it is a value here rather
/// than an error; the coordinator turns it into a typed error for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The store accepted `token`
    Acquired { token: IdentityToken, attempts: u32 },
    /// Every attempt was refused or failed
    Exhausted { attempts: u32, store_errors: u32 },
    /// The cancellation signal fired between attempts
    Cancelled { attempts: u32 },
}

impl AcquireOutcome {
    pub fn token(&self) -> Option<&IdentityToken> {
        match self {
            AcquireOutcome::Acquired { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn into_token(self) -> Option<IdentityToken> {
        match self {
            AcquireOutcome::Acquired { token, .. } => Some(token),
            _ => None,
        }
    }
}

/// Lock client over a [`LockStore`]
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn LockStore>,
    retry: RetryPolicy,
}

impl LockClient {
    pub fn new(store: Arc<dyn LockStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Try to acquire `key`, retrying up to `max_retries` times
    ///
    /// Makes at most `max_retries + 1` store calls. Between attempts the task
    /// sleeps for the policy's delay; `cancel` is honored only during that
    /// sleep (or before the first attempt), never mid-store-call. A store
    /// error counts as a refused attempt but is logged separately from
    /// contention.
    pub async fn acquire_with_retry(
        &self,
        key: &LockKey,
        ttl: Duration,
        max_retries: u32,
        cancel: Option<&CancellationToken>,
    ) -> AcquireOutcome {
        let token = IdentityToken::generate();
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut store_errors: u32 = 0;

        loop {
            if let Some(cancel) = cancel
                && cancel.is_cancelled()
            {
                debug!(key = %key, attempts, "Lock acquisition cancelled");
                return AcquireOutcome::Cancelled { attempts };
            }

            attempts += 1;
            match self.store.acquire_if_absent(key, &token, ttl).await {
                Ok(true) => {
                    metrics::record_acquire_wait(started);
                    info!(key = %key, attempts, store = self.store.name(), "Lock acquired");
                    return AcquireOutcome::Acquired { token, attempts };
                }
                Ok(false) => {
                    debug!(key = %key, attempt = attempts, "Lock held by another owner");
                }
                Err(e) => {
                    store_errors += 1;
                    metrics::record_store_error("acquire_if_absent");
                    warn!(key = %key, attempt = attempts, error = %e, "Store error while acquiring lock");
                }
            }

            let retry = attempts - 1;
            if retry >= max_retries {
                break;
            }

            let delay = self.retry.delay(retry);
            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(key = %key, attempts, "Lock acquisition cancelled while waiting");
                            return AcquireOutcome::Cancelled { attempts };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }

        metrics::record_acquire_wait(started);
        info!(key = %key, attempts, store_errors, "Lock acquisition exhausted retry budget");
        AcquireOutcome::Exhausted {
            attempts,
            store_errors,
        }
    }

    /// Delete the store record if it still carries `token`
    ///
    /// `Ok(false)` means we no longer own the lock (it expired and may have
    /// been re-acquired elsewhere).
    pub async fn release(&self, key: &LockKey, token: &IdentityToken) -> LockResult<bool> {
        self.store
            .compare_and_delete(key, token)
            .await
            .inspect_err(|e| {
                metrics::record_store_error("compare_and_delete");
                warn!(key = %key, error = %e, "Store error while releasing lock");
            })
    }

    /// Extend the store record's TTL if it still carries `token`
    pub async fn renew(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool> {
        self.store
            .compare_and_extend(key, token, ttl)
            .await
            .inspect_err(|e| {
                metrics::record_store_error("compare_and_extend");
                warn!(key = %key, error = %e, "Store error while renewing lock");
            })
    }
}
