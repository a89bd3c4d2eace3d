//! 任务服务门面
//!
//! 面向两类调用方：
//!
//! - 终端用户：先经 [`AuthService`] 认证身份，再按操作校验权限；
//! - Worker回调：只凭派发时签发的回调令牌认证，令牌限定在一次任务调用范围内，
//!   令牌一经通过校验即被核销并换发新令牌，即使之后的处理失败，新令牌也随错误返回。

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use taskmesh_core::{
    models::{
        PageRequest, Paged, ResultFilter, ResultStatus, ScheduleDefinition, ScheduleFilter,
        TaskDefinition, TaskDefinitionFilter, TaskLog, TaskResult, TaskUniqueId, WorkerInfo,
    },
    traits::{
        AuthService, Identity, Permission, ResultStore, ScheduleRepository, TaskCaller,
        TaskDefinitionRepository,
    },
    Result, TaskMeshError,
};
use taskmesh_dispatcher::{SrvTokenAuthority, SrvTokenBinding, TaskDispatcher};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTaskRequest {
    pub codename: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    pub timeout_ms: i64,
}

/// Worker回调成功后返回的下一张令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackReceipt {
    pub next_srv_token: String,
}

/// Worker回调失败
///
/// 令牌通过校验之后的失败会附带已换发的新令牌，Worker凭它重试。
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct CallbackError {
    #[source]
    pub error: TaskMeshError,
    pub next_srv_token: Option<String>,
}

impl From<TaskMeshError> for CallbackError {
    fn from(error: TaskMeshError) -> Self {
        Self {
            error,
            next_srv_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvTokenCheck {
    pub valid: bool,
    pub next_srv_token: Option<String>,
}

/// 日志流中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub task_unique_id: String,
    pub content: String,
}

/// 单行日志写入确认，`seq` 从1开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAck {
    pub seq: u64,
}

pub type LogAckStream = BoxStream<'static, Result<LogAck>>;

pub struct TaskService {
    dispatcher: Arc<TaskDispatcher>,
    tokens: Arc<SrvTokenAuthority>,
    results: Arc<dyn ResultStore>,
    definitions: Arc<dyn TaskDefinitionRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    auth: Arc<dyn AuthService>,
}

impl TaskService {
    pub fn new(
        dispatcher: Arc<TaskDispatcher>,
        tokens: Arc<SrvTokenAuthority>,
        results: Arc<dyn ResultStore>,
        definitions: Arc<dyn TaskDefinitionRepository>,
        schedules: Arc<dyn ScheduleRepository>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            dispatcher,
            tokens,
            results,
            definitions,
            schedules,
            auth,
        }
    }

    async fn authorize(&self, bearer: &str, permission: Permission) -> Result<Identity> {
        let identity = self.auth.authenticate(bearer).await?;
        self.auth.authorize(&identity, permission).await?;
        Ok(identity)
    }

    pub async fn call_task(&self, bearer: &str, request: CallTaskRequest) -> Result<String> {
        let identity = self.authorize(bearer, Permission::CallTask).await?;
        let id = self
            .dispatcher
            .call_task(
                &request.codename,
                request.arguments,
                &identity.user,
                request.timeout_ms,
            )
            .await?;
        Ok(id.encode())
    }

    pub async fn kill_task(&self, bearer: &str, task_unique_id: &str) -> Result<()> {
        let identity = self.authorize(bearer, Permission::KillTask).await?;
        info!(user = %identity.user, task_unique_id, "终止任务");
        self.dispatcher.kill_task(task_unique_id).await
    }

    pub async fn get_result(&self, bearer: &str, task_unique_id: &str) -> Result<TaskResult> {
        self.authorize(bearer, Permission::ReadResult).await?;
        let id = TaskUniqueId::decode(task_unique_id)?;
        self.results
            .get_result(id.partition_label(), id.result_id())
            .await?
            .ok_or_else(|| TaskMeshError::NotFound(format!("任务 {id}")))
    }

    pub async fn list_task_logs(
        &self,
        bearer: &str,
        task_unique_id: &str,
        page: PageRequest,
    ) -> Result<Paged<TaskLog>> {
        self.authorize(bearer, Permission::ReadResult).await?;
        let id = TaskUniqueId::decode(task_unique_id)?;
        self.results
            .list_logs(id.partition_label(), id.result_id(), page)
            .await
    }

    /// 结果查询限定在单个分区内
    pub async fn paged_list_results(
        &self,
        bearer: &str,
        partition_label: &str,
        filter: &ResultFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskResult>> {
        self.authorize(bearer, Permission::ReadResult).await?;
        self.results
            .paged_list_results(partition_label, filter, page)
            .await
    }

    pub async fn paged_list_tasks(
        &self,
        bearer: &str,
        filter: &TaskDefinitionFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskDefinition>> {
        self.authorize(bearer, Permission::ListTasks).await?;
        self.definitions.paged_list(filter, page).await
    }

    pub async fn paged_list_schedules(
        &self,
        bearer: &str,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> Result<Paged<ScheduleDefinition>> {
        self.authorize(bearer, Permission::ListSchedules).await?;
        self.schedules.paged_list(filter, page).await
    }

    pub async fn list_workers(&self, bearer: &str) -> Result<Vec<WorkerInfo>> {
        self.authorize(bearer, Permission::ListWorkers).await?;
        self.dispatcher.registry().list().await
    }

    /// 当前在线Worker数量，不做认证，供健康检查使用
    pub async fn live_worker_count(&self) -> Result<usize> {
        Ok(self.dispatcher.registry().list().await?.len())
    }

    /// 核销回调令牌，返回令牌绑定的调用范围
    async fn redeem_callback(&self, srv_token: &str) -> Result<SrvTokenBinding> {
        self.tokens
            .redeem_binding(srv_token)
            .await?
            .ok_or_else(|| TaskMeshError::Auth("回调令牌无效或已过期".to_string()))
    }

    fn check_scope(binding: &SrvTokenBinding, task_unique_id: &str) -> Result<()> {
        if binding.task_unique_id != task_unique_id {
            warn!(
                bound = %binding.task_unique_id,
                requested = task_unique_id,
                "回调令牌不属于该任务"
            );
            return Err(TaskMeshError::Auth(format!(
                "回调令牌不属于任务 {task_unique_id}"
            )));
        }
        Ok(())
    }

    /// 令牌核销并确认范围后立即换发新令牌，之后的任何失败都把新令牌随错误返回
    pub async fn set_result_status(
        &self,
        srv_token: &str,
        task_unique_id: &str,
        status: ResultStatus,
    ) -> std::result::Result<CallbackReceipt, CallbackError> {
        let binding = self.redeem_callback(srv_token).await?;
        Self::check_scope(&binding, task_unique_id)?;
        let next_srv_token = self.tokens.mint_for(&binding).await?;

        match self.apply_reported_status(task_unique_id, status).await {
            Ok(()) => Ok(CallbackReceipt { next_srv_token }),
            Err(error) => Err(CallbackError {
                error,
                next_srv_token: Some(next_srv_token),
            }),
        }
    }

    async fn apply_reported_status(&self, task_unique_id: &str, status: ResultStatus) -> Result<()> {
        let id = TaskUniqueId::decode(task_unique_id)?;
        let current = self
            .results
            .get_result(id.partition_label(), id.result_id())
            .await?
            .ok_or_else(|| TaskMeshError::NotFound(format!("任务 {id}")))?;
        current.status.check_transition(status).inspect_err(|e| {
            warn!(task_unique_id = %id, from = %current.status, to = %status, error = %e, "拒绝状态变更");
        })?;

        self.results
            .set_result_status(id.partition_label(), id.result_id(), status)
            .await?;
        info!(
            task_unique_id = %id,
            partition = id.partition_label(),
            result_id = id.result_id(),
            from = %current.status,
            to = %status,
            "Worker回报任务状态"
        );
        Ok(())
    }

    /// 逐行写入日志流
    ///
    /// 令牌在流开始前核销并换发，返回新令牌和确认流。每写入一行产出一个 [`LogAck`]；
    /// 第一次失败时产出该错误并结束流，之后的行不再处理。
    pub async fn append_task_log<S>(
        &self,
        srv_token: &str,
        lines: S,
    ) -> Result<(String, LogAckStream)>
    where
        S: Stream<Item = Result<LogLine>> + Send + 'static,
    {
        let binding = self.redeem_callback(srv_token).await?;
        let id = TaskUniqueId::decode(&binding.task_unique_id)?;
        let next_srv_token = self.tokens.mint_for(&binding).await?;

        struct State<S> {
            lines: std::pin::Pin<Box<S>>,
            results: Arc<dyn ResultStore>,
            id: TaskUniqueId,
            seq: u64,
            done: bool,
        }

        let state = State {
            lines: Box::pin(lines),
            results: self.results.clone(),
            id,
            seq: 0,
            done: false,
        };

        let acks = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            let line = state.lines.next().await?;
            let outcome = match line {
                Ok(line) if line.task_unique_id != state.id.encode() => {
                    Err(TaskMeshError::Auth(format!(
                        "日志行不属于任务 {}",
                        state.id
                    )))
                }
                Ok(line) => state
                    .results
                    .new_log(state.id.partition_label(), state.id.result_id(), &line.content)
                    .await
                    .map(|_| {
                        state.seq += 1;
                        LogAck { seq: state.seq }
                    }),
                Err(e) => Err(e),
            };
            match &outcome {
                Ok(ack) => debug!(task_unique_id = %state.id, seq = ack.seq, "写入任务日志"),
                Err(e) => {
                    warn!(task_unique_id = %state.id, seq = state.seq, error = %e, "日志流中止");
                    state.done = true;
                }
            }
            Some((outcome, state))
        });

        Ok((next_srv_token, acks.boxed()))
    }

    /// 核销令牌并在有效时换发新令牌
    pub async fn is_valid_srv_token(&self, srv_token: &str) -> Result<SrvTokenCheck> {
        match self.tokens.redeem_binding(srv_token).await? {
            Some(binding) => {
                let next = self.tokens.mint_for(&binding).await?;
                Ok(SrvTokenCheck {
                    valid: true,
                    next_srv_token: Some(next),
                })
            }
            None => Ok(SrvTokenCheck {
                valid: false,
                next_srv_token: None,
            }),
        }
    }
}

/// 定时调度器通过此入口触发任务，不经过终端用户认证
#[async_trait]
impl TaskCaller for TaskService {
    async fn call_task(
        &self,
        codename: &str,
        arguments: serde_json::Value,
        caller: &str,
        timeout_ms: i64,
    ) -> Result<String> {
        let id = self
            .dispatcher
            .call_task(codename, arguments, caller, timeout_ms)
            .await?;
        Ok(id.encode())
    }
}
