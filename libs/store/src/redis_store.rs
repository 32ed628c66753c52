use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use tracing::{debug, instrument};

use crate::{StoreError, StoreResult, TtlStore, ttl_millis};

// Lua: only delete if the value matches, so a stale holder never removes a successor's key.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
else
  return 0
end
"#;

const COMPARE_AND_EXPIRE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
  return 0
end
"#;

const INCREMENT_WITH_TTL: &str = r#"
local value = redis.call("INCR", KEYS[1])
if value == 1 then
  redis.call("PEXPIRE", KEYS[1], ARGV[1])
end
return value
"#;

/// Redis-backed store shared by every replica of the service.
pub struct RedisTtlStore {
    connection: ConnectionManager,
    compare_and_delete: Script,
    compare_and_expire: Script,
    increment_with_ttl: Script,
}

impl RedisTtlStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|err| StoreError::unavailable("connect", err))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|err| StoreError::unavailable("connect", err))?;
        debug!("connected redis ttl store");
        Ok(Self {
            connection,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE),
            increment_with_ttl: Script::new(INCREMENT_WITH_TTL),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl TtlStore for RedisTtlStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|err| StoreError::unavailable("get", err))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable("set", err))
    }

    #[instrument(name = "store.redis.set_if_absent", skip(self, key, value), fields(key = %key))]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable("set_if_absent", err))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable("delete", err))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let removed: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable("compare_and_delete", err))?;
        Ok(removed == 1)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut conn = self.conn();
        let extended: i64 = self
            .compare_and_expire
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable("compare_and_expire", err))?;
        Ok(extended == 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn();
        let extended: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::unavailable("expire", err))?;
        Ok(extended == 1)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut conn = self.conn();
        let value: i64 = self
            .increment_with_ttl
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| match err.kind() {
                redis::ErrorKind::ResponseError | redis::ErrorKind::ExtensionError => {
                    StoreError::InvalidValue {
                        key: key.to_string(),
                        reason: err.to_string(),
                    }
                }
                _ => StoreError::unavailable("increment", err),
            })?;
        Ok(value.max(0) as u64)
    }
}
