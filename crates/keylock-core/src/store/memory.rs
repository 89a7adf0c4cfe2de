// In-memory lock store
// Atomic set-if-absent / compare-and-delete / compare-and-extend over DashMap,
// with optional background expiry

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::LockStore;
use crate::error::LockResult;
use crate::model::{IdentityToken, LockKey};

/// A live lock record
#[derive(Debug, Clone)]
pub(crate) struct LockEntry {
    token: IdentityToken,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockEntry {
    fn new(token: IdentityToken, ttl: Duration) -> Self {
        Self {
            token,
            acquired_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.ttl
    }
}

/// In-memory lock store using DashMap
///
/// Each primitive runs under the shard lock of its key, which makes it
/// atomic with respect to every other primitive on the same key. Expired
/// records are treated as absent on access; the optional sweeper only
/// reclaims memory.
pub struct MemoryLockStore {
    pub(crate) locks: Arc<DashMap<String, LockEntry>>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockStore {
    /// Create a store without a background sweeper
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            cleanup_handle: None,
        }
    }

    /// Create a store and start the background expiry task
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_cleanup(interval: Duration) -> Self {
        let locks: Arc<DashMap<String, LockEntry>> = Arc::new(DashMap::new());

        let locks_clone = locks.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = Self::sweep_expired(&locks_clone);
                if removed > 0 {
                    debug!(count = removed, "Cleaned up expired lock entries");
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "MemoryLockStore initialized with background expiry task");

        Self {
            locks,
            cleanup_handle: Some(handle),
        }
    }

    fn sweep_expired(locks: &DashMap<String, LockEntry>) -> usize {
        let before = locks.len();
        locks.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(locks.len())
    }

    /// Remove expired records now, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        Self::sweep_expired(&self.locks)
    }

    /// Token of the live record for `key`, if any
    pub fn holder(&self, key: &LockKey) -> Option<IdentityToken> {
        self.locks
            .get(key.as_str())
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.token.clone())
    }

    /// Number of live records
    pub fn live_count(&self) -> usize {
        self.locks.iter().filter(|entry| !entry.is_expired()).count()
    }

    /// Drop a record regardless of its token (admin operation)
    pub fn force_release(&self, key: &LockKey) -> bool {
        self.locks.remove(key.as_str()).is_some()
    }
}

impl Drop for MemoryLockStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire_if_absent(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool> {
        match self.locks.entry(key.as_str().to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(false);
                }
                occupied.insert(LockEntry::new(token.clone(), ttl));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockEntry::new(token.clone(), ttl));
            }
        }
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &LockKey, token: &IdentityToken) -> LockResult<bool> {
        let removed = self
            .locks
            .remove_if(key.as_str(), |_, entry| {
                &entry.token == token && !entry.is_expired()
            })
            .is_some();
        Ok(removed)
    }

    async fn compare_and_extend(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool> {
        match self.locks.get_mut(key.as_str()) {
            Some(mut entry) if &entry.token == token && !entry.is_expired() => {
                entry.acquired_at = Instant::now();
                entry.ttl = ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
