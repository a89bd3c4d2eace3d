use std::sync::Arc;

use chrono::Utc;
use rand::seq::IndexedRandom;
use taskmesh_core::{
    models::{
        NewTaskResult, PartitionGranularity, ResultStatus, TaskDefinition, TaskUniqueId,
        WorkerCallTaskRequest, WorkerKillTaskRequest,
    },
    traits::{ResultStore, TaskDefinitionRepository, WorkerClient},
    Result, TaskMeshError,
};
use tracing::{error, info, warn};

use crate::srv_token::{SrvTokenAuthority, SrvTokenBinding};
use crate::worker_registry::WorkerRegistry;

pub const NOT_RUNNING_MESSAGE: &str = "task is not in running status";

/// 任务派发与终止
///
/// 决定任务命运的失败（代号非法、没有Worker、RPC失败）总是先写入结果状态再返回错误，
/// 调用方看到的错误与存储的状态保持一致。
pub struct TaskDispatcher {
    registry: Arc<WorkerRegistry>,
    tokens: Arc<SrvTokenAuthority>,
    results: Arc<dyn ResultStore>,
    definitions: Arc<dyn TaskDefinitionRepository>,
    worker_client: Arc<dyn WorkerClient>,
    granularity: PartitionGranularity,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        tokens: Arc<SrvTokenAuthority>,
        results: Arc<dyn ResultStore>,
        definitions: Arc<dyn TaskDefinitionRepository>,
        worker_client: Arc<dyn WorkerClient>,
        granularity: PartitionGranularity,
    ) -> Self {
        Self {
            registry,
            tokens,
            results,
            definitions,
            worker_client,
            granularity,
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// 写入失败终态后返回原始错误；终态本身写入失败时返回存储错误。
    /// 记录已被Worker回报为终态时保留该终态，返回 `InvalidTransition`。
    async fn fail_with(
        &self,
        id: &TaskUniqueId,
        status: ResultStatus,
        cause: TaskMeshError,
    ) -> TaskMeshError {
        match self
            .results
            .set_result_status(id.partition_label(), id.result_id(), status)
            .await
        {
            Ok(()) => {
                warn!(
                    task_unique_id = %id,
                    partition = id.partition_label(),
                    result_id = id.result_id(),
                    %status,
                    error = %cause,
                    "任务进入失败终态"
                );
                cause
            }
            Err(store_err @ TaskMeshError::InvalidTransition { .. }) => {
                warn!(
                    task_unique_id = %id,
                    %status,
                    cause = %cause,
                    error = %store_err,
                    "任务已进入终态，保留已有结果"
                );
                store_err
            }
            Err(store_err) => {
                error!(
                    task_unique_id = %id,
                    %status,
                    cause = %cause,
                    error = %store_err,
                    "写入失败终态时存储出错"
                );
                store_err
            }
        }
    }

    pub async fn call_task(
        &self,
        codename: &str,
        arguments: serde_json::Value,
        caller: &str,
        timeout_ms: i64,
    ) -> Result<TaskUniqueId> {
        let start_at = Utc::now();
        let label = self.granularity.label_for(start_at);
        self.results.ensure_partition(&label).await?;

        let created = self
            .results
            .new_result(
                &label,
                &NewTaskResult {
                    task_codename: codename.to_string(),
                    caller: caller.to_string(),
                    timeout_ms,
                    arguments: arguments.clone(),
                    start_at,
                },
            )
            .await?;
        let id = TaskUniqueId::new(label.as_str(), created.id)?;

        let (modular, name) = match TaskDefinition::split_codename(codename) {
            Ok(parts) => parts,
            Err(e) => return Err(self.fail_with(&id, ResultStatus::CallError, e).await),
        };

        match self.definitions.get_by_codename(codename).await {
            Ok(Some(definition)) if definition.disabled => {
                let e = TaskMeshError::Validation(format!("任务已被禁用: {codename}"));
                return Err(self.fail_with(&id, ResultStatus::CallError, e).await);
            }
            Ok(_) => {}
            Err(e) => return Err(self.fail_with(&id, ResultStatus::CallError, e).await),
        }

        let candidates = match self.registry.list_by_modular(modular).await {
            Ok(workers) => workers,
            Err(e) => return Err(self.fail_with(&id, ResultStatus::NoWorkerError, e).await),
        };
        let worker = {
            let mut rng = rand::rng();
            candidates.choose(&mut rng).cloned()
        };
        let Some(worker) = worker else {
            let e = TaskMeshError::NoWorkerAvailable(format!("模块 {modular} 没有在线Worker"));
            return Err(self.fail_with(&id, ResultStatus::NoWorkerError, e).await);
        };

        let binding = SrvTokenBinding::new(worker.address.as_str(), id.encode());
        let srv_token = match self.tokens.mint_for(&binding).await {
            Ok(token) => token,
            Err(e) => return Err(self.fail_with(&id, ResultStatus::CallError, e).await),
        };

        let request = WorkerCallTaskRequest {
            name: name.to_string(),
            task_unique_id: id.encode(),
            arguments,
            timeout_ms,
            caller: caller.to_string(),
            start_timestamp: start_at,
        };
        match self
            .worker_client
            .call_task(&worker, &srv_token, &request)
            .await
        {
            Ok(ack) if ack.success => {}
            Ok(ack) => {
                let e = TaskMeshError::DispatchFailure(format!(
                    "Worker {} 拒绝了任务: {}",
                    worker.worker_id,
                    ack.message.unwrap_or_default()
                ));
                return Err(self.fail_with(&id, ResultStatus::CallError, e).await);
            }
            Err(e) => {
                let e = match e {
                    TaskMeshError::DispatchFailure(_) => e,
                    other => TaskMeshError::DispatchFailure(other.to_string()),
                };
                return Err(self.fail_with(&id, ResultStatus::CallError, e).await);
            }
        }

        if let Err(e) = self
            .results
            .mark_dispatched(id.partition_label(), id.result_id(), &worker.worker_id)
            .await
        {
            warn!(task_unique_id = %id, worker_id = %worker.worker_id, error = %e, "记录承接Worker失败");
        }

        info!(
            task_unique_id = %id,
            codename,
            caller,
            worker_id = %worker.worker_id,
            "任务已派发"
        );
        Ok(id)
    }

    pub async fn kill_task(&self, task_unique_id: &str) -> Result<()> {
        let id = TaskUniqueId::decode(task_unique_id)?;
        let result = self
            .results
            .get_result(id.partition_label(), id.result_id())
            .await?
            .ok_or_else(|| TaskMeshError::NotFound(format!("任务 {id}")))?;

        if result.status != ResultStatus::Running {
            warn!(task_unique_id = %id, status = %result.status, "拒绝终止非运行中的任务");
            return Err(TaskMeshError::Validation(NOT_RUNNING_MESSAGE.to_string()));
        }

        let worker = match result.worker.as_deref() {
            Some(worker_id) => self.registry.get_by_id(worker_id).await?,
            None => None,
        };
        let Some(worker) = worker else {
            let e = TaskMeshError::NoWorkerAvailable(format!(
                "任务 {id} 的Worker {} 已不在线",
                result.worker.as_deref().unwrap_or("-")
            ));
            return Err(self.fail_with(&id, ResultStatus::NoWorkerError, e).await);
        };

        let request = WorkerKillTaskRequest {
            task_unique_id: id.encode(),
            timestamp: Utc::now(),
        };
        let ack = self
            .worker_client
            .kill_task(&worker, &request)
            .await
            .map_err(|e| match e {
                TaskMeshError::DispatchFailure(_) => e,
                other => TaskMeshError::DispatchFailure(other.to_string()),
            })?;
        if !ack.success {
            return Err(TaskMeshError::DispatchFailure(format!(
                "Worker {} 拒绝终止任务: {}",
                worker.worker_id,
                ack.message.unwrap_or_default()
            )));
        }

        info!(task_unique_id = %id, worker_id = %worker.worker_id, "已向Worker发送终止信号");
        Ok(())
    }
}
