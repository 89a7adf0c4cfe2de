//! Lock coordinator: the façade callers use
//!
//! Composes [`KeyCodec`], [`LockClient`] and [`ReentrancyTracker`]:
//!
//! - `acquire`: build key → reentrant fast path if this context already holds
//!   it → otherwise acquire from the store with retry and record the hold
//! - `release`: drop one hold → when the outermost level unwinds, delete the
//!   store record with the recorded token
//!
//! Per (context, key): Unheld → Held(1) → Held(n) → … → Held(1) → Unheld.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{AcquireOutcome, LockClient};
use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::key::KeyCodec;
use crate::metrics;
use crate::model::{CallerContext, IdentityToken, LockHandle, LockKey, LockRequest, ReleaseOutcome};
use crate::reentrancy::{ReentrancyTracker, ReleaseStep};
use crate::store::{LockStore, build_store};

/// Point-in-time view of a coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    pub namespace: String,
    pub store: &'static str,
    pub reentrant_entries: usize,
}

/// Reentrant distributed lock coordinator
pub struct LockCoordinator {
    namespace: String,
    codec: KeyCodec,
    client: LockClient,
    tracker: ReentrancyTracker,
    default_ttl: Duration,
    default_max_retries: u32,
    extend_on_reentry: bool,
}

impl LockCoordinator {
    /// Create a coordinator over an existing store
    pub fn new(store: Arc<dyn LockStore>, config: &LockConfig) -> LockResult<Self> {
        config.validate()?;
        Ok(Self {
            namespace: config.namespace.clone(),
            codec: config.key_codec(),
            client: LockClient::new(store, config.retry_policy()),
            tracker: ReentrancyTracker::new(),
            default_ttl: config.default_ttl(),
            default_max_retries: config.default_max_retries,
            extend_on_reentry: config.extend_on_reentry,
        })
    }

    /// Build the configured store and a coordinator over it
    pub async fn from_config(config: &LockConfig) -> LockResult<Self> {
        config.validate()?;
        let store = build_store(config).await?;
        Self::new(store, config)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn client(&self) -> &LockClient {
        &self.client
    }

    /// Compose the key `request` resolves to
    pub fn key_for(&self, request: &LockRequest) -> LockResult<LockKey> {
        self.codec
            .build_key_for(&self.namespace, &request.name, &request.policy, &request.args)
    }

    /// Acquire the lock described by `request` for `context`
    pub async fn acquire(
        &self,
        context: &CallerContext,
        request: &LockRequest,
    ) -> LockResult<LockHandle> {
        self.acquire_inner(context, request, None).await
    }

    /// Like [`acquire`](Self::acquire), aborting the retry loop when `cancel` fires
    pub async fn acquire_cancellable(
        &self,
        context: &CallerContext,
        request: &LockRequest,
        cancel: &CancellationToken,
    ) -> LockResult<LockHandle> {
        self.acquire_inner(context, request, Some(cancel)).await
    }

    async fn acquire_inner(
        &self,
        context: &CallerContext,
        request: &LockRequest,
        cancel: Option<&CancellationToken>,
    ) -> LockResult<LockHandle> {
        let key = self.key_for(request)?;
        let ttl = request.ttl.unwrap_or(self.default_ttl);
        let max_retries = request.max_retries.unwrap_or(self.default_max_retries);

        if let Some(token) = self.tracker.current_token(context, &key) {
            return self.reenter(context, key, token, ttl).await;
        }

        match self
            .client
            .acquire_with_retry(&key, ttl, max_retries, cancel)
            .await
        {
            AcquireOutcome::Acquired { token, .. } => {
                let depth = match self.tracker.record_acquire(context, &key, &token) {
                    Ok(depth) => depth,
                    Err(e) => {
                        // Same context raced itself on two tasks; give the record back
                        if let Err(release_err) = self.client.release(&key, &token).await {
                            warn!(key = %key, error = %release_err, "Failed to return lock after bookkeeping conflict");
                        }
                        return Err(e);
                    }
                };
                metrics::record_acquire("acquired");
                Ok(LockHandle {
                    context: context.clone(),
                    key,
                    token,
                    depth,
                })
            }
            AcquireOutcome::Exhausted { attempts, .. } => {
                metrics::record_acquire("exhausted");
                info!(key = %key, retry_count = max_retries, "Lock acquisition failed after retries");
                Err(LockError::AcquisitionFailed {
                    key: key.to_string(),
                    attempts,
                })
            }
            AcquireOutcome::Cancelled { .. } => {
                metrics::record_acquire("cancelled");
                Err(LockError::Cancelled {
                    key: key.to_string(),
                })
            }
        }
    }

    async fn reenter(
        &self,
        context: &CallerContext,
        key: LockKey,
        token: IdentityToken,
        ttl: Duration,
    ) -> LockResult<LockHandle> {
        if self.extend_on_reentry && !self.client.renew(&key, &token, ttl).await? {
            warn!(key = %key, context = %context, "Reentrant acquire found the store record gone");
            metrics::record_acquire("exhausted");
            return Err(LockError::AcquisitionFailed {
                key: key.to_string(),
                attempts: 1,
            });
        }

        let depth = self.tracker.record_acquire(context, &key, &token)?;
        metrics::record_acquire("reentrant");
        info!(key = %key, depth, "Reentrant lock acquired");
        Ok(LockHandle {
            context: context.clone(),
            key,
            token,
            depth,
        })
    }

    /// Release one level of `handle`
    ///
    /// Only the outermost level reaches the store. A token mismatch there is
    /// reported as [`ReleaseOutcome::Mismatch`]; local bookkeeping is cleared
    /// either way.
    pub async fn release(&self, handle: LockHandle) -> LockResult<ReleaseOutcome> {
        let step = self.release_local(&handle)?;
        if step.remaining > 0 {
            return Ok(ReleaseOutcome::StillHeld {
                remaining: step.remaining,
            });
        }
        self.release_store(&handle.key, &step.token).await
    }

    /// Drop one hold locally; a step with `remaining == 0` means the store
    /// record must be deleted next
    fn release_local(&self, handle: &LockHandle) -> LockResult<ReleaseStep> {
        let step = self
            .tracker
            .record_release(&handle.context, &handle.key)
            .inspect_err(|e| {
                metrics::record_release("without_hold");
                warn!(key = %handle.key, context = %handle.context, error = %e, "Release without hold");
            })?;

        if step.remaining > 0 {
            metrics::record_release("still_held");
            debug!(key = %handle.key, remaining = step.remaining, "Reentrant level released, lock still held");
        }
        Ok(step)
    }

    async fn release_store(&self, key: &LockKey, token: &IdentityToken) -> LockResult<ReleaseOutcome> {
        if self.client.release(key, token).await? {
            metrics::record_release("released");
            info!(key = %key, "Lock released");
            Ok(ReleaseOutcome::Released)
        } else {
            metrics::record_release("mismatch");
            warn!(key = %key, "Lock record no longer ours at release (expired or taken over)");
            Ok(ReleaseOutcome::Mismatch)
        }
    }

    /// Extend the TTL of a held lock
    pub async fn renew(&self, handle: &LockHandle, ttl: Option<Duration>) -> LockResult<bool> {
        let token = self
            .tracker
            .current_token(&handle.context, &handle.key)
            .ok_or_else(|| LockError::ReleaseWithoutHold {
                key: handle.key.to_string(),
            })?;
        let renewed = self
            .client
            .renew(&handle.key, &token, ttl.unwrap_or(self.default_ttl))
            .await?;
        if !renewed {
            warn!(key = %handle.key, "Lock renewal refused (expired or taken over)");
        }
        Ok(renewed)
    }

    /// Release everything `context` still holds, whatever the hold counts
    pub async fn release_context(&self, context: &CallerContext) -> Vec<(LockKey, LockResult<ReleaseOutcome>)> {
        let mut results = Vec::new();
        for (key, token) in self.tracker.clear_context(context) {
            let outcome = self.release_store(&key, &token).await;
            results.push((key, outcome));
        }
        results
    }

    /// Hold count of `context` on the key `request` resolves to
    pub fn hold_count(&self, context: &CallerContext, request: &LockRequest) -> LockResult<u32> {
        let key = self.key_for(request)?;
        Ok(self.tracker.hold_count(context, &key))
    }

    /// Number of (context, key) holds in this process
    pub fn held_entries(&self) -> usize {
        self.tracker.len()
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            namespace: self.namespace.clone(),
            store: self.client.store().name(),
            reentrant_entries: self.tracker.len(),
        }
    }

    /// Acquire and wrap the handle in a guard that releases on drop
    pub async fn guard(
        self: &Arc<Self>,
        context: &CallerContext,
        request: &LockRequest,
    ) -> LockResult<LockGuard> {
        let handle = self.acquire(context, request).await?;
        Ok(LockGuard {
            coordinator: self.clone(),
            key: handle.key.clone(),
            handle: Some(handle),
        })
    }

    /// Run `work` while holding the lock, releasing on every exit path
    ///
    /// The work's output is returned even if the final release reports a
    /// problem; that problem is logged.
    pub async fn with_lock<F, Fut, T>(
        self: &Arc<Self>,
        context: &CallerContext,
        request: &LockRequest,
        work: F,
    ) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.guard(context, request).await?;
        let output = work().await;
        if let Err(e) = guard.release().await {
            warn!(error = %e, "Release after guarded work failed");
        }
        Ok(output)
    }
}

/// Scoped hold on a lock
///
/// Prefer [`LockGuard::release`]. If the guard is dropped instead (early
/// return, panic, cancelled task), the local hold is dropped immediately and
/// the store delete is spawned on the current tokio runtime.
pub struct LockGuard {
    coordinator: Arc<LockCoordinator>,
    key: LockKey,
    /// `None` once released or dropped
    handle: Option<LockHandle>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_ref()
    }

    /// Release explicitly and observe the outcome
    pub async fn release(mut self) -> LockResult<ReleaseOutcome> {
        let Some(handle) = self.handle.take() else {
            return Err(LockError::ReleaseWithoutHold {
                key: self.key.to_string(),
            });
        };
        self.coordinator.release(handle).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let token = match self.coordinator.release_local(&handle) {
            Ok(step) if step.remaining == 0 => step.token,
            _ => return,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let coordinator = self.coordinator.clone();
                let key = handle.key;
                runtime.spawn(async move {
                    if let Err(e) = coordinator.release_store(&key, &token).await {
                        warn!(key = %key, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %handle.key, "Lock guard dropped outside a runtime; record left to expire");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPolicy;
    use crate::store::MemoryLockStore;

    fn config() -> LockConfig {
        LockConfig {
            namespace: "orderSvc".to_string(),
            retry_interval_ms: 10,
            default_ttl_ms: 10_000,
            memory_sweep_interval_ms: 0,
            ..Default::default()
        }
    }

    fn request() -> LockRequest {
        LockRequest::new("inventoryLock")
            .with_policy(KeyPolicy::All)
            .with_arg("sku", "sku-42")
            .with_max_retries(0)
    }

    fn coordinator() -> (Arc<MemoryLockStore>, Arc<LockCoordinator>) {
        let store = Arc::new(MemoryLockStore::new());
        let coordinator = LockCoordinator::new(store.clone(), &config()).unwrap();
        (store, Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_acquire_release() {
        let (store, coordinator) = coordinator();
        let ctx = CallerContext::new();

        let handle = coordinator.acquire(&ctx, &request()).await.unwrap();
        assert_eq!(handle.key().as_str(), "orderSvc:inventoryLock:sku-42");
        assert_eq!(handle.depth(), 1);
        assert_eq!(store.holder(handle.key()), Some(handle.token().clone()));

        let key = handle.key().clone();
        assert_eq!(coordinator.release(handle).await.unwrap(), ReleaseOutcome::Released);
        assert_eq!(store.holder(&key), None);
        assert_eq!(coordinator.held_entries(), 0);
    }

    #[tokio::test]
    async fn test_reentrant_handles_share_token() {
        let (_store, coordinator) = coordinator();
        let ctx = CallerContext::new();

        let outer = coordinator.acquire(&ctx, &request()).await.unwrap();
        let inner = coordinator.acquire(&ctx, &request()).await.unwrap();
        assert_eq!(outer.token(), inner.token());
        assert!(inner.is_reentrant());
        assert_eq!(coordinator.hold_count(&ctx, &request()).unwrap(), 2);

        assert_eq!(
            coordinator.release(inner).await.unwrap(),
            ReleaseOutcome::StillHeld { remaining: 1 }
        );
        assert_eq!(coordinator.release(outer).await.unwrap(), ReleaseOutcome::Released);
    }

    #[tokio::test]
    async fn test_other_context_fails() {
        let (_store, coordinator) = coordinator();
        let holder = CallerContext::new();
        let _handle = coordinator.acquire(&holder, &request()).await.unwrap();

        let err = coordinator
            .acquire(&CallerContext::new(), &request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LockError::AcquisitionFailed {
                key: "orderSvc:inventoryLock:sku-42".to_string(),
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_release_twice_is_without_hold() {
        let (_store, coordinator) = coordinator();
        let ctx = CallerContext::new();
        let handle = coordinator.acquire(&ctx, &request()).await.unwrap();
        let forged = LockHandle {
            context: handle.context().clone(),
            key: handle.key().clone(),
            token: handle.token().clone(),
            depth: 1,
        };

        coordinator.release(handle).await.unwrap();
        let err = coordinator.release(forged).await.unwrap_err();
        assert!(matches!(err, LockError::ReleaseWithoutHold { .. }));
    }

    #[tokio::test]
    async fn test_key_too_long_is_not_retried() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            max_key_length: 24,
            ..config()
        };
        let coordinator = LockCoordinator::new(store, &config).unwrap();

        let err = coordinator
            .acquire(&CallerContext::new(), &request().with_max_retries(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::KeyTooLong { max: 24, .. }));
    }

    #[tokio::test]
    async fn test_extend_on_reentry() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            extend_on_reentry: true,
            ..config()
        };
        let coordinator = LockCoordinator::new(store.clone(), &config).unwrap();
        let ctx = CallerContext::new();
        let short = request().with_ttl(Duration::from_millis(40));

        let outer = coordinator.acquire(&ctx, &short).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        let inner = coordinator
            .acquire(&ctx, &short.clone().with_ttl(Duration::from_secs(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Extended by the nested acquire, so still live past the first TTL
        assert_eq!(store.holder(outer.key()), Some(outer.token().clone()));
        coordinator.release(inner).await.unwrap();
        assert_eq!(coordinator.release(outer).await.unwrap(), ReleaseOutcome::Released);
    }

    #[tokio::test]
    async fn test_extend_on_reentry_after_loss_fails() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            extend_on_reentry: true,
            ..config()
        };
        let coordinator = LockCoordinator::new(store.clone(), &config).unwrap();
        let ctx = CallerContext::new();

        let outer = coordinator.acquire(&ctx, &request()).await.unwrap();
        store.force_release(outer.key());

        let err = coordinator.acquire(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, LockError::AcquisitionFailed { .. }));
        assert_eq!(coordinator.release(outer).await.unwrap(), ReleaseOutcome::Mismatch);
    }

    #[tokio::test]
    async fn test_renew() {
        let (store, coordinator) = coordinator();
        let ctx = CallerContext::new();
        let handle = coordinator
            .acquire(&ctx, &request().with_ttl(Duration::from_millis(30)))
            .await
            .unwrap();

        assert!(coordinator.renew(&handle, Some(Duration::from_secs(10))).await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.holder(handle.key()), Some(handle.token().clone()));

        store.force_release(handle.key());
        assert!(!coordinator.renew(&handle, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_drop_releases() {
        let (store, coordinator) = coordinator();
        let ctx = CallerContext::new();
        let key = coordinator.key_for(&request()).unwrap();

        {
            let guard = coordinator.guard(&ctx, &request()).await.unwrap();
            assert_eq!(guard.key(), &key);
        }
        assert_eq!(coordinator.held_entries(), 0);

        // The store delete runs on a spawned task
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.holder(&key), None);
    }

    #[tokio::test]
    async fn test_guard_explicit_release() {
        let (store, coordinator) = coordinator();
        let ctx = CallerContext::new();
        let guard = coordinator.guard(&ctx, &request()).await.unwrap();
        let key = guard.key().clone();
        assert_eq!(guard.handle().map(|h| h.depth()), Some(1));

        assert_eq!(guard.release().await.unwrap(), ReleaseOutcome::Released);
        assert_eq!(coordinator.held_entries(), 0);
        assert_eq!(store.holder(&key), None);
    }

    #[tokio::test]
    async fn test_with_lock_releases_after_error() {
        let (store, coordinator) = coordinator();
        let ctx = CallerContext::new();
        let key = coordinator.key_for(&request()).unwrap();

        let result: LockResult<Result<(), String>> = coordinator
            .with_lock(&ctx, &request(), || async { Err("boom".to_string()) })
            .await;
        assert_eq!(result.unwrap(), Err("boom".to_string()));
        assert_eq!(store.holder(&key), None);
        assert_eq!(coordinator.held_entries(), 0);
    }

    #[tokio::test]
    async fn test_release_context() {
        let (store, coordinator) = coordinator();
        let ctx = CallerContext::new();
        let a = coordinator.acquire(&ctx, &request()).await.unwrap();
        let _nested = coordinator.acquire(&ctx, &request()).await.unwrap();
        let b = coordinator
            .acquire(&ctx, &LockRequest::new("other"))
            .await
            .unwrap();

        assert_eq!(coordinator.stats().reentrant_entries, 2);
        assert_eq!(coordinator.stats().store, "memory");

        let results = coordinator.release_context(&ctx).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|(_, outcome)| outcome == &Ok(ReleaseOutcome::Released)));
        assert_eq!(store.holder(a.key()), None);
        assert_eq!(store.holder(b.key()), None);
        assert_eq!(coordinator.held_entries(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            separator: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            LockCoordinator::new(store, &config),
            Err(LockError::Config(_))
        ));
    }
}
