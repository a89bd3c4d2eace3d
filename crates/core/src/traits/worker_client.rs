use async_trait::async_trait;

use crate::{
    models::{WorkerAck, WorkerCallTaskRequest, WorkerInfo, WorkerKillTaskRequest},
    Result,
};

/// 调用Worker的RPC客户端
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn call_task(
        &self,
        worker: &WorkerInfo,
        srv_token: &str,
        request: &WorkerCallTaskRequest,
    ) -> Result<WorkerAck>;

    async fn kill_task(&self, worker: &WorkerInfo, request: &WorkerKillTaskRequest)
        -> Result<WorkerAck>;
}
