//! Redis lock store
//!
//! - acquire: `SET key token NX PX ttl`
//! - release: Lua `GET == token then DEL`
//! - extend: Lua `GET == token then PEXPIRE`
//!
//! The compare-and-act steps run as server-side scripts so no other client
//! can slip in between reading the token and acting on it.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, Script};
use async_trait::async_trait;
use tracing::debug;

use super::LockStore;
use crate::error::{LockError, LockResult};
use crate::model::{IdentityToken, LockKey};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Lock store backed by a Redis server
#[derive(Clone)]
pub struct RedisLockStore {
    conn: MultiplexedConnection,
    release_script: Script,
    extend_script: Script,
}

impl RedisLockStore {
    /// Connect to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379/`)
    pub async fn connect(redis_url: &str) -> LockResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LockError::Store(format!("failed to create redis client: {}", e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Store(format!("failed to connect redis: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already established connection
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            release_script: Script::new(RELEASE_SCRIPT),
            extend_script: Script::new(EXTEND_SCRIPT),
        }
    }
}

/// `PX` rejects zero, so sub-millisecond TTLs round up to 1 ms
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn acquire_if_absent(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key.as_str())
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        debug!(key = %key, acquired = reply.is_some(), "SET NX PX");
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &LockKey, token: &IdentityToken) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .release_script
            .key(key.as_str())
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn compare_and_extend(
        &self,
        key: &LockKey,
        token: &IdentityToken,
        ttl: Duration,
    ) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .extend_script
            .key(key.as_str())
            .arg(token.as_str())
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_rounds_up() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_micros(300)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(100)), 100);
    }

    #[test]
    fn test_scripts_compare_before_acting() {
        assert!(RELEASE_SCRIPT.contains(r#"redis.call("GET", KEYS[1]) == ARGV[1]"#));
        assert!(RELEASE_SCRIPT.contains("DEL"));
        assert!(EXTEND_SCRIPT.contains("PEXPIRE"));
    }
}
