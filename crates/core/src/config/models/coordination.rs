use serde::{Deserialize, Serialize};

/// Redis协调服务配置（服务发现、领导者租约、回调令牌）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "taskmesh/".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.url));
        }
        Ok(())
    }
}

/// Worker服务发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Worker记录的键前缀（拼接在 `redis.key_prefix` 之后）
    pub worker_prefix: String,
    pub scan_count: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            worker_prefix: "workers/".to_string(),
            scan_count: 100,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_prefix.is_empty() {
            return Err(anyhow::anyhow!("Worker键前缀不能为空"));
        }
        if self.scan_count == 0 {
            return Err(anyhow::anyhow!("SCAN批量大小必须大于0"));
        }
        Ok(())
    }
}
