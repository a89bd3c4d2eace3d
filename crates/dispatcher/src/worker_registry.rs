use std::sync::Arc;

use taskmesh_core::{models::WorkerInfo, traits::WorkerDiscovery, Result};
use tracing::{debug, warn};

/// Worker注册表的只读视图
///
/// 每次调用都实时读取服务发现后端，不做缓存。单条记录解码失败只记录日志并跳过，
/// 不影响其他Worker。
pub struct WorkerRegistry {
    discovery: Arc<dyn WorkerDiscovery>,
}

impl WorkerRegistry {
    pub fn new(discovery: Arc<dyn WorkerDiscovery>) -> Self {
        Self { discovery }
    }

    pub async fn list(&self) -> Result<Vec<WorkerInfo>> {
        let entries = self.discovery.list_entries().await?;
        let mut workers = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_slice::<WorkerInfo>(&entry.value) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "跳过无法解析的Worker记录");
                }
            }
        }
        debug!(count = workers.len(), "读取Worker列表");
        Ok(workers)
    }

    pub async fn list_by_modular(&self, modular: &str) -> Result<Vec<WorkerInfo>> {
        let workers = self.list().await?;
        Ok(workers.into_iter().filter(|w| w.serves(modular)).collect())
    }

    /// 按ID查找，找不到返回 `None`
    pub async fn get_by_id(&self, worker_id: &str) -> Result<Option<WorkerInfo>> {
        let workers = self.list().await?;
        Ok(workers.into_iter().find(|w| w.worker_id == worker_id))
    }
}
