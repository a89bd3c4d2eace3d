use async_trait::async_trait;

use crate::Result;

/// 定时调度器触发任务时使用的调用入口
#[async_trait]
pub trait TaskCaller: Send + Sync {
    async fn call_task(
        &self,
        codename: &str,
        arguments: serde_json::Value,
        caller: &str,
        timeout_ms: i64,
    ) -> Result<String>;
}
