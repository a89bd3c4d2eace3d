use serde::{Deserialize, Serialize};

use crate::models::PartitionGranularity;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 调用Worker RPC的超时时间
    pub worker_rpc_timeout_ms: u64,
    pub srv_token_ttl_seconds: u64,
    pub partition_granularity: PartitionGranularity,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_rpc_timeout_ms: 5_000,
            srv_token_ttl_seconds: 300,
            partition_granularity: PartitionGranularity::Year,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_rpc_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Worker RPC超时时间必须大于0"));
        }
        if self.srv_token_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("回调令牌有效期必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 全局领导者键（拼接在 `redis.key_prefix` 之后）
    pub leader_key: String,
    pub lease_ttl_seconds: u64,
    /// 启动时加载调度定义的分页大小
    pub load_page_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            leader_key: "scheduler/leader".to_string(),
            lease_ttl_seconds: 15,
            load_page_size: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.leader_key.is_empty() {
            return Err(anyhow::anyhow!("领导者键不能为空"));
        }
        if self.lease_ttl_seconds < 3 {
            return Err(anyhow::anyhow!("租约有效期不能小于3秒"));
        }
        if self.load_page_size <= 0 {
            return Err(anyhow::anyhow!("分页大小必须大于0"));
        }
        Ok(())
    }
}
