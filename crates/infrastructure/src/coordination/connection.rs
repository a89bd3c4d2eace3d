use redis::aio::ConnectionManager;
use taskmesh_core::{config::models::RedisConfig, Result, TaskMeshError};
use tracing::{debug, info};

/// 共享的Redis连接，内部为自动重连的 `ConnectionManager`，可廉价克隆
#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisConnection {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| TaskMeshError::Coordination(format!("创建Redis客户端失败: {e}")))?;
        let mut manager = client.get_connection_manager().await?;

        let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
        debug!(response = %pong, "Redis连接测试成功");
        info!(url = %config.url, "已连接Redis");

        Ok(Self {
            manager,
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

/// 转义SCAN MATCH模式中的通配字符
pub(crate) fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("taskmesh/workers/"), "taskmesh/workers/");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }
}
