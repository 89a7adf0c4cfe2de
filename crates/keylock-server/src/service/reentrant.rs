//! Guarded service whose outer method reenters a lock held by its caller

use std::sync::Arc;

use keylock_core::{CallerContext, KeyPolicy, LockCoordinator, LockRequest, LockResult};
use serde::Serialize;
use tracing::info;

use crate::model::DemoConfig;

pub const REENTRANT_LOCK_NAME: &str = "lockKey";
const REENTRANT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReentrantReport {
    pub key: String,
    /// Depth observed by the nested method (2 when it reentered)
    pub inner_depth: u32,
}

#[derive(Clone)]
pub struct ReentrantService {
    coordinator: Arc<LockCoordinator>,
    config: DemoConfig,
}

impl ReentrantService {
    pub fn new(coordinator: Arc<LockCoordinator>, config: DemoConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Every argument is part of the key, so callers with different `num`
    /// values never contend
    fn request(&self, num: &str) -> LockRequest {
        LockRequest::new(REENTRANT_LOCK_NAME)
            .with_policy(KeyPolicy::All)
            .with_arg("num", num)
            .with_ttl(self.config.lock_ttl)
            .with_max_retries(REENTRANT_MAX_RETRIES)
    }

    /// Holds the lock for `num` and calls [`method2`](Self::method2) under it
    pub async fn method1(&self, context: &CallerContext, num: &str) -> LockResult<ReentrantReport> {
        let request = self.request(num);
        let key = self.coordinator.key_for(&request)?;

        let inner_depth = self
            .coordinator
            .with_lock(context, &request, || self.method2(context, num))
            .await??;

        info!(key = %key, inner_depth, "method1 finished");
        Ok(ReentrantReport {
            key: key.to_string(),
            inner_depth,
        })
    }

    /// Locks the same key as `method1`; returns the hold depth it saw
    pub async fn method2(&self, context: &CallerContext, num: &str) -> LockResult<u32> {
        let guard = self.coordinator.guard(context, &self.request(num)).await?;
        let depth = guard.handle().map(|h| h.depth()).unwrap_or_default();

        tokio::time::sleep(self.config.hold).await;
        info!(num, depth, hold_ms = self.config.hold.as_millis() as u64, "method2 done");

        guard.release().await?;
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylock_core::{LockConfig, LockError, MemoryLockStore};
    use std::time::Duration;

    fn service() -> ReentrantService {
        let config = LockConfig {
            namespace: "aspectlock".to_string(),
            retry_interval_ms: 5,
            memory_sweep_interval_ms: 0,
            ..Default::default()
        };
        let coordinator =
            LockCoordinator::new(Arc::new(MemoryLockStore::new()), &config).unwrap();
        ReentrantService::new(
            Arc::new(coordinator),
            DemoConfig {
                hold: Duration::from_millis(5),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_method1_reenters() {
        let service = service();
        let report = service.method1(&CallerContext::new(), "42").await.unwrap();

        assert_eq!(report.key, "aspectlock:lockKey:42");
        assert_eq!(report.inner_depth, 2);
        assert_eq!(service.coordinator.held_entries(), 0);
    }

    #[tokio::test]
    async fn test_method2_alone_is_outermost() {
        let service = service();
        assert_eq!(service.method2(&CallerContext::new(), "42").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_held_key_blocks_other_callers() {
        let service = service();
        let holder = CallerContext::new();
        let _handle = service
            .coordinator
            .acquire(&holder, &service.request("42"))
            .await
            .unwrap();

        let err = service.method1(&CallerContext::new(), "42").await.unwrap_err();
        assert!(matches!(err, LockError::AcquisitionFailed { attempts: 4, .. }));

        // A different argument is a different key
        let report = service.method1(&CallerContext::new(), "43").await.unwrap();
        assert_eq!(report.inner_depth, 2);
    }
}
