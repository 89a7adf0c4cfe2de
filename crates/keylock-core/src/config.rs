//! Lock protocol settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, LockResult};
use crate::key::{DEFAULT_KEY_SEPARATOR, DEFAULT_MAX_KEY_LENGTH, KeyCodec};

/// Which store adapter backs the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-process DashMap store (single node, tests)
    #[default]
    Memory,
    /// Shared Redis server
    Redis,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            _ => Err(format!("Invalid store kind: {}", s)),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::Redis => write!(f, "redis"),
        }
    }
}

/// Lock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Application namespace prefixed to every key
    pub namespace: String,
    /// Separator between key segments
    pub separator: String,
    /// Maximum composed key length
    pub max_key_length: usize,
    /// TTL used when a request does not set one
    pub default_ttl_ms: u64,
    /// Retry budget used when a request does not set one
    pub default_max_retries: u32,
    /// Delay before the first retry
    pub retry_interval_ms: u64,
    /// Backoff multiplier (1.0 = fixed interval)
    pub retry_multiplier: f64,
    /// Upper bound for the backoff delay
    pub max_retry_interval_ms: u64,
    /// Extend the store TTL when a context reenters a lock it holds
    pub extend_on_reentry: bool,
    /// Store adapter
    pub store: StoreKind,
    /// Redis connection URL
    pub redis_url: String,
    /// Sweep interval for expired records in the memory store (0 = no sweeper)
    pub memory_sweep_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            separator: DEFAULT_KEY_SEPARATOR.to_string(),
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            default_ttl_ms: 30000,
            default_max_retries: 3,
            retry_interval_ms: 100,
            retry_multiplier: 1.0,
            max_retry_interval_ms: 2000,
            extend_on_reentry: false,
            store: StoreKind::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            memory_sweep_interval_ms: 5000,
        }
    }
}

impl LockConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> LockResult<()> {
        if self.separator.is_empty() {
            return Err(LockError::Config("separator must not be empty".to_string()));
        }
        if !self.namespace.is_ascii() || !self.separator.is_ascii() {
            return Err(LockError::Config(
                "namespace and separator must be ASCII".to_string(),
            ));
        }
        if self.namespace.contains(self.separator.as_str()) {
            return Err(LockError::Config(format!(
                "namespace '{}' must not contain the separator '{}'",
                self.namespace, self.separator
            )));
        }
        if self.namespace.len() + self.separator.len() >= self.max_key_length {
            return Err(LockError::Config(format!(
                "namespace '{}' leaves no room under max_key_length {}",
                self.namespace, self.max_key_length
            )));
        }
        if self.default_ttl_ms == 0 {
            return Err(LockError::Config("default_ttl_ms must be > 0".to_string()));
        }
        if self.retry_multiplier.is_nan() || self.retry_multiplier < 1.0 {
            return Err(LockError::Config(
                "retry_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn key_codec(&self) -> KeyCodec {
        KeyCodec::new(self.separator.clone(), self.max_key_length)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.retry_interval_ms),
            multiplier: self.retry_multiplier,
            max_interval: Duration::from_millis(self.max_retry_interval_ms),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

/// Delay schedule between acquisition attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub interval: Duration,
    /// Growth factor applied after each retry
    pub multiplier: f64,
    /// Cap for any single delay
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(100))
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            multiplier: 1.0,
            max_interval: interval,
        }
    }

    pub fn exponential(interval: Duration, multiplier: f64, max_interval: Duration) -> Self {
        Self {
            interval,
            multiplier,
            max_interval,
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(32) as i32);
        let millis = (self.interval.as_millis() as f64 * factor)
            .min(self.max_interval.max(self.interval).as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}
