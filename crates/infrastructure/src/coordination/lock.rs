use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use taskmesh_core::{
    traits::{AcquireOutcome, DistributedLock},
    Result,
};
use tracing::{debug, warn};

use super::connection::RedisConnection;

const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// `SET NX PX` 实现的可续约锁，持有者令牌就是写入的值
pub struct RedisDistributedLock {
    conn: RedisConnection,
    renew_script: Script,
    release_script: Script,
}

impl RedisDistributedLock {
    pub fn new(conn: RedisConnection) -> Self {
        Self {
            conn,
            renew_script: Script::new(RENEW_SCRIPT),
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<AcquireOutcome> {
        let mut conn = self.conn.manager();
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        if created.is_some() {
            debug!(key, "获得分布式锁");
            return Ok(AcquireOutcome::Acquired {
                token: value.to_string(),
            });
        }

        let holder = self.current_holder(key).await?;
        Ok(AcquireOutcome::Held { holder })
    }

    async fn renew(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.manager();
        let renewed: i64 = self
            .renew_script
            .key(key)
            .arg(token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        if renewed != 1 {
            warn!(key, "续约失败，租约已不属于当前持有者");
        }
        Ok(renewed == 1)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.manager();
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn current_holder(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.manager();
        let holder: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(holder)
    }
}
