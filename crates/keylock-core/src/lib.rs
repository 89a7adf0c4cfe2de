//! Keylock Core - Reentrant distributed locks over a shared key-value store
//!
//! This crate provides:
//! - Deterministic lock key composition from a namespace, a logical name and
//!   selected call arguments
//! - Acquire with bounded retry and per-acquisition identity tokens
//! - Owner-checked release and renewal
//! - Per-caller-context reentrancy so nested acquisitions of the same key
//!   succeed without contacting the store
//! - Memory and Redis store backends

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod metrics;
pub mod model;
pub mod reentrancy;
pub mod store;

// Re-export commonly used types
pub use client::{AcquireOutcome, LockClient};
pub use config::{LockConfig, RetryPolicy, StoreKind};
pub use coordinator::{LockCoordinator, LockGuard, LockStats};
pub use error::{LockError, LockResult};
pub use key::{KeyCodec, KeyPolicy};
pub use model::{
    CallerContext, IdentityToken, LockArg, LockHandle, LockKey, LockRequest, ReleaseOutcome,
};
pub use reentrancy::ReentrancyTracker;
pub use store::{LockStore, MemoryLockStore, build_store};

#[cfg(feature = "redis-backend")]
pub use store::RedisLockStore;

pub use tokio_util::sync::CancellationToken;
