//! Value types shared by the lock components

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::key::KeyPolicy;

/// Fully-qualified lock key
///
/// Built by [`crate::key::KeyCodec`], which guarantees the configured
/// length limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey(String);

impl LockKey {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for LockKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Proof of ownership for one acquisition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentityToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for IdentityToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for IdentityToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of reentrancy: one thread of control or one logical task
///
/// Contexts are passed explicitly. Two handles acquired under the same
/// context for the same key share a store record; different contexts
/// always contend.
///
/// A context must not be shared across concurrently running tasks: the
/// reentrant path reads the held token and records the new level as two
/// steps, so a concurrent release of the last level on another task would
/// leave a hold whose store record is gone. Give each task its own context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerContext(String);

impl CallerContext {
    /// Create a context with a random identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create a context from a caller-chosen identifier (e.g. a request id)
    pub fn named(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CallerContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named argument of a guarded call, used for key discriminators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockArg {
    pub name: String,
    pub value: String,
}

impl LockArg {
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

/// Declaration of one guarded operation
///
/// `ttl` and `max_retries` fall back to the coordinator's configured
/// defaults when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct LockRequest {
    pub name: String,
    pub policy: KeyPolicy,
    pub args: Vec<LockArg>,
    pub ttl: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl LockRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: KeyPolicy::Ignore,
            args: Vec::new(),
            ttl: None,
            max_retries: None,
        }
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.args.push(LockArg::new(name, value));
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Proof of a successful acquire, consumed by release
#[derive(Debug, PartialEq, Eq)]
pub struct LockHandle {
    pub(crate) context: CallerContext,
    pub(crate) key: LockKey,
    pub(crate) token: IdentityToken,
    pub(crate) depth: u32,
}

impl LockHandle {
    pub fn context(&self) -> &CallerContext {
        &self.context
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn token(&self) -> &IdentityToken {
        &self.token
    }

    /// Hold count right after this acquire (1 for the outermost level)
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether this handle came from the reentrant fast path
    pub fn is_reentrant(&self) -> bool {
        self.depth > 1
    }
}

/// Result of a release that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Outermost level unwound and the store record was deleted
    Released,
    /// An outer reentrant level still holds the lock; no store call made
    StillHeld { remaining: u32 },
    /// The store record no longer carried our token (expired or taken over).
    /// Local bookkeeping is cleared regardless.
    Mismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_tokens_are_unique() {
        let a = IdentityToken::generate();
        let b = IdentityToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_caller_context() {
        assert_ne!(CallerContext::new(), CallerContext::new());
        assert_eq!(CallerContext::named("req-1").id(), "req-1");
    }

    #[test]
    fn test_lock_request_builder() {
        let request = LockRequest::new("inventoryLock")
            .with_policy(KeyPolicy::All)
            .with_arg("sku", "sku-42")
            .with_ttl(Duration::from_millis(100))
            .with_max_retries(3);

        assert_eq!(request.name, "inventoryLock");
        assert_eq!(request.args, vec![LockArg::new("sku", "sku-42")]);
        assert_eq!(request.ttl, Some(Duration::from_millis(100)));
        assert_eq!(request.max_retries, Some(3));
    }

    #[test]
    fn test_release_outcome_serialization() {
        let json = serde_json::to_string(&ReleaseOutcome::StillHeld { remaining: 2 }).unwrap();
        assert_eq!(json, r#"{"still_held":{"remaining":2}}"#);
        let json = serde_json::to_string(&ReleaseOutcome::Released).unwrap();
        assert_eq!(json, r#""released""#);
    }
}
