use std::time::Duration;

use async_trait::async_trait;
use taskmesh_core::{traits::TokenStore, Result};

use super::connection::RedisConnection;

/// 回调令牌存储，`GETDEL` 保证取出即失效
pub struct RedisTokenStore {
    conn: RedisConnection,
    prefix: String,
}

impl RedisTokenStore {
    pub fn new(conn: RedisConnection) -> Self {
        let prefix = format!("{}srv_tokens/", conn.key_prefix());
        Self { conn, prefix }
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}{}", self.prefix, token)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put(&self, token: &str, binding: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.manager();
        let _: () = redis::cmd("SET")
            .arg(self.token_key(token))
            .arg(binding)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<String>> {
        let mut conn = self.conn.manager();
        let binding: Option<String> = redis::cmd("GETDEL")
            .arg(self.token_key(token))
            .query_async(&mut conn)
            .await?;
        Ok(binding)
    }
}
