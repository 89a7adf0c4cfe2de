//! Store boundary of the lock protocol
//!
//! The protocol needs exactly three atomic primitives from the shared
//! key-value store. Each must be a single atomic step on the store side:
//! checking the token and acting on it are never split into two round trips.
//!
//! `Ok(false)` means the store answered and refused (contention, token
//! mismatch, missing record). `Err` means the store could not be asked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{LockConfig, StoreKind};
use crate::error::LockResult;
use crate::model::{IdentityToken, LockKey};

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::MemoryLockStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisLockStore;

/// Atomic primitives required from the shared store
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key -> token` with `ttl` only if no live record exists
    async fn acquire_if_absent(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool>;

    /// Delete the record only if it currently carries `token`
    async fn compare_and_delete(&self, key: &LockKey, token: &IdentityToken) -> LockResult<bool>;

    /// Reset the record's TTL only if it currently carries `token`
    async fn compare_and_extend(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Build the store selected by `config.store`
pub async fn build_store(config: &LockConfig) -> LockResult<Arc<dyn LockStore>> {
    match config.store {
        StoreKind::Memory => {
            let store = if config.memory_sweep_interval_ms > 0 {
                MemoryLockStore::with_cleanup(Duration::from_millis(config.memory_sweep_interval_ms))
            } else {
                MemoryLockStore::new()
            };
            info!("Using in-memory lock store");
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis-backend")]
        StoreKind::Redis => {
            let store = RedisLockStore::connect(&config.redis_url).await?;
            info!(url = %config.redis_url, "Using redis lock store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-backend"))]
        StoreKind::Redis => Err(crate::error::LockError::Config(
            "redis store requested but the `redis-backend` feature is disabled".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;

    #[tokio::test]
    async fn test_build_memory_store() {
        let config = LockConfig {
            memory_sweep_interval_ms: 0,
            ..Default::default()
        };
        let store = build_store(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn test_build_memory_store_with_sweeper() {
        let store = build_store(&LockConfig::default()).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_store_error_is_not_contention() {
        assert!(!LockError::Store("unreachable".to_string()).is_contention());
    }
}
