//! Per-context reentrancy bookkeeping
//!
//! Maps `(CallerContext, LockKey)` to the token backing the store record and
//! a hold count. Entries are removed as soon as the count reaches zero so the
//! table only ever contains locks that are currently held.
//!
//! The table is a single DashMap; each operation touches one shard for the
//! duration of a lookup/insert/delete and never across an await.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use crate::error::{LockError, LockResult};
use crate::metrics;
use crate::model::{CallerContext, IdentityToken, LockKey};

#[derive(Debug, Clone)]
struct ReentrancyEntry {
    token: IdentityToken,
    hold_count: u32,
}

/// Result of decrementing a hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStep {
    /// Token recorded for the hold
    pub token: IdentityToken,
    /// Holds left after this release; zero means the entry was removed
    pub remaining: u32,
}

/// Reentrancy table keyed by caller context and lock key
#[derive(Debug, Default)]
pub struct ReentrancyTracker {
    entries: DashMap<(CallerContext, LockKey), ReentrancyEntry>,
}

impl ReentrancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful acquire, returning the new hold count
    ///
    /// A nested acquire must present the token already on record.
    pub fn record_acquire(
        &self,
        context: &CallerContext,
        key: &LockKey,
        token: &IdentityToken,
    ) -> LockResult<u32> {
        let count = match self.entries.entry((context.clone(), key.clone())) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if &entry.token != token {
                    warn!(context = %context, key = %key, "Reentrant acquire presented a different token");
                    return Err(LockError::TokenConflict {
                        key: key.to_string(),
                    });
                }
                entry.hold_count += 1;
                entry.hold_count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ReentrancyEntry {
                    token: token.clone(),
                    hold_count: 1,
                });
                1
            }
        };

        debug!(context = %context, key = %key, hold_count = count, "Recorded lock hold");
        metrics::set_reentrant_entries(self.entries.len());
        Ok(count)
    }

    /// Token held by `context` for `key`, if any
    pub fn current_token(&self, context: &CallerContext, key: &LockKey) -> Option<IdentityToken> {
        self.entries
            .get(&(context.clone(), key.clone()))
            .map(|entry| entry.token.clone())
    }

    /// Current hold count (0 when not held)
    pub fn hold_count(&self, context: &CallerContext, key: &LockKey) -> u32 {
        self.entries
            .get(&(context.clone(), key.clone()))
            .map(|entry| entry.hold_count)
            .unwrap_or(0)
    }

    /// Drop one hold; the entry is removed when the count reaches zero
    pub fn record_release(&self, context: &CallerContext, key: &LockKey) -> LockResult<ReleaseStep> {
        let step = match self.entries.entry((context.clone(), key.clone())) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.hold_count = entry.hold_count.saturating_sub(1);
                if entry.hold_count == 0 {
                    let removed = occupied.remove();
                    ReleaseStep {
                        token: removed.token,
                        remaining: 0,
                    }
                } else {
                    ReleaseStep {
                        token: entry.token.clone(),
                        remaining: entry.hold_count,
                    }
                }
            }
            Entry::Vacant(_) => {
                return Err(LockError::ReleaseWithoutHold {
                    key: key.to_string(),
                });
            }
        };

        debug!(context = %context, key = %key, remaining = step.remaining, "Released lock hold");
        metrics::set_reentrant_entries(self.entries.len());
        Ok(step)
    }

    /// Remove every entry of `context`, returning what it held
    pub fn clear_context(&self, context: &CallerContext) -> Vec<(LockKey, IdentityToken)> {
        let keys: Vec<(CallerContext, LockKey)> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().0 == context)
            .map(|entry| entry.key().clone())
            .collect();

        let removed: Vec<(LockKey, IdentityToken)> = keys
            .into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .map(|((_, key), entry)| (key, entry.token))
            .collect();

        metrics::set_reentrant_entries(self.entries.len());
        removed
    }

    /// Number of tracked (context, key) entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
