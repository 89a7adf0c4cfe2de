//! Lock key construction
//!
//! Keys have the form `{namespace}{SEP}{logicalName}{SEP}{discriminator}...`.
//! Every process contending for the same resource must build the same string,
//! so the codec is a pure function of its inputs.

use tracing::debug;

use crate::error::{LockError, LockResult};
use crate::model::{LockArg, LockKey};

/// Default separator between key segments
pub const DEFAULT_KEY_SEPARATOR: &str = ":";

/// Default upper bound on the composed key length (bytes)
pub const DEFAULT_MAX_KEY_LENGTH: usize = 256;

/// How a guarded call turns its arguments into key discriminators
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Every argument's string form, in argument order
    All,
    /// Only the argument with this name
    Named(String),
    /// No discriminators: one fixed key per logical name
    #[default]
    Ignore,
}

impl KeyPolicy {
    pub fn named(name: impl Into<String>) -> Self {
        KeyPolicy::Named(name.into())
    }

    /// Select discriminators from the call arguments
    pub fn extract(&self, args: &[LockArg]) -> Vec<String> {
        match self {
            KeyPolicy::All => args.iter().map(|arg| arg.value.clone()).collect(),
            KeyPolicy::Named(name) => {
                let selected: Vec<String> = args
                    .iter()
                    .filter(|arg| &arg.name == name)
                    .map(|arg| arg.value.clone())
                    .collect();
                if selected.is_empty() {
                    debug!(argument = %name, "Named key argument not present, using fixed key");
                }
                selected
            }
            KeyPolicy::Ignore => Vec::new(),
        }
    }
}

/// Builds and validates lock keys
#[derive(Debug, Clone)]
pub struct KeyCodec {
    separator: String,
    max_len: usize,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_SEPARATOR, DEFAULT_MAX_KEY_LENGTH)
    }
}

impl KeyCodec {
    pub fn new(separator: impl Into<String>, max_len: usize) -> Self {
        Self {
            separator: separator.into(),
            max_len,
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Compose `{namespace}{SEP}{logical_name}{SEP}{d1}{SEP}{d2}...`
    ///
    /// Segments must be ASCII and must not contain the separator, so distinct
    /// discriminator lists never compose to the same key.
    pub fn build_key<S: AsRef<str>>(
        &self,
        namespace: &str,
        logical_name: &str,
        discriminators: &[S],
    ) -> LockResult<LockKey> {
        self.check_segment(namespace)?;
        self.check_segment(logical_name)?;
        for discriminator in discriminators {
            self.check_segment(discriminator.as_ref())?;
        }

        let mut key = String::with_capacity(
            namespace.len() + logical_name.len() + self.separator.len() * (1 + discriminators.len()),
        );
        key.push_str(namespace);
        key.push_str(&self.separator);
        key.push_str(logical_name);
        for discriminator in discriminators {
            key.push_str(&self.separator);
            key.push_str(discriminator.as_ref());
        }

        if key.len() > self.max_len {
            return Err(LockError::KeyTooLong {
                len: key.len(),
                max: self.max_len,
                key,
            });
        }

        Ok(LockKey::new(key))
    }

    fn check_segment(&self, segment: &str) -> LockResult<()> {
        let reason = if !segment.is_ascii() {
            "not ASCII"
        } else if segment.contains(self.separator.as_str()) {
            "contains the key separator"
        } else {
            return Ok(());
        };
        Err(LockError::InvalidKeySegment {
            segment: segment.to_string(),
            reason,
        })
    }

    /// Build a key by applying `policy` to the call arguments
    pub fn build_key_for(
        &self,
        namespace: &str,
        logical_name: &str,
        policy: &KeyPolicy,
        args: &[LockArg],
    ) -> LockResult<LockKey> {
        let discriminators = policy.extract(args);
        self.build_key(namespace, logical_name, discriminators.as_slice())
    }
}
