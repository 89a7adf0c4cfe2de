//! Error types for the lock protocol
//!
//! `LockError` covers every failure the coordinator surfaces to callers.
//! A release whose token no longer matches the store record is *not* an
//! error: it is reported through `ReleaseOutcome::Mismatch` because the
//! protected work has already finished when release runs.

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Lock protocol errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Composed key is longer than the configured maximum (configuration error, never retried)
    #[error("lock key is too long ({len} > {max}): {key}")]
    KeyTooLong { key: String, len: usize, max: usize },

    /// Key segment that could make two different inputs compose to the same key
    #[error("invalid lock key segment '{segment}': {reason}")]
    InvalidKeySegment {
        segment: String,
        reason: &'static str,
    },

    /// Retry budget exhausted while another holder kept the key
    #[error("failed to acquire lock '{key}' after {attempts} attempt(s)")]
    AcquisitionFailed { key: String, attempts: u32 },

    /// Caller cancelled the acquisition between two attempts
    #[error("acquisition of lock '{key}' was cancelled")]
    Cancelled { key: String },

    /// Release called for a context/key pair that holds nothing
    #[error("release called without a hold on lock '{key}'")]
    ReleaseWithoutHold { key: String },

    /// Reentrant record carries a token different from the one presented
    #[error("token conflict on reentrant lock '{key}'")]
    TokenConflict { key: String },

    /// Store or connectivity failure
    #[error("store error: {0}")]
    Store(String),

    /// Invalid settings
    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Whether the error is an expected contention outcome rather than a fault
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            LockError::AcquisitionFailed { .. } | LockError::Cancelled { .. }
        )
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::Store(format!("redis: {}", err))
    }
}
