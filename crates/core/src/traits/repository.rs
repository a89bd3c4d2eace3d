use async_trait::async_trait;

use crate::{
    models::{
        NewTaskResult, PageRequest, Paged, Partition, ResultFilter, ResultStatus,
        ScheduleDefinition, ScheduleFilter, TaskDefinition, TaskDefinitionFilter, TaskLog,
        TaskResult,
    },
    Result,
};

/// 按时间分区的结果/日志存储
///
/// 除分区元数据外，所有操作都限定在单个分区的物理表内，不做跨分区查询。
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 事务性地创建分区元数据和两张物理表，任何一步失败都整体回滚
    async fn create_partition(&self, label: &str) -> Result<Partition>;

    /// 获取分区，不存在时创建
    async fn ensure_partition(&self, label: &str) -> Result<Partition>;

    async fn get_partition(&self, label: &str) -> Result<Option<Partition>>;

    /// 根据稳定的分区ID解析分区标签
    async fn resolve_partition_label(&self, partition_id: i64) -> Result<String>;

    async fn list_partitions(&self) -> Result<Vec<Partition>>;

    async fn new_result(&self, label: &str, result: &NewTaskResult) -> Result<TaskResult>;

    async fn get_result(&self, label: &str, result_id: i64) -> Result<Option<TaskResult>>;

    /// 写入状态，终态时同时写入 `end_at`
    ///
    /// 只有当前仍是非终态的记录会被更新；记录已是终态时返回 `InvalidTransition`，
    /// 记录不存在时返回 `NotFound`。
    async fn set_result_status(
        &self,
        label: &str,
        result_id: i64,
        status: ResultStatus,
    ) -> Result<()>;

    async fn set_result_worker(&self, label: &str, result_id: i64, worker_id: &str) -> Result<()>;

    /// 记录承接的Worker，并且仅当记录仍处于 `Initialization` 时推进到 `Running`
    async fn mark_dispatched(&self, label: &str, result_id: i64, worker_id: &str) -> Result<()>;

    async fn paged_list_results(
        &self,
        label: &str,
        filter: &ResultFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskResult>>;

    async fn new_log(&self, label: &str, result_id: i64, content: &str) -> Result<TaskLog>;

    async fn list_logs(
        &self,
        label: &str,
        result_id: i64,
        page: PageRequest,
    ) -> Result<Paged<TaskLog>>;
}

/// 任务定义仓储（只读视图）
#[async_trait]
pub trait TaskDefinitionRepository: Send + Sync {
    async fn get_by_codename(&self, codename: &str) -> Result<Option<TaskDefinition>>;

    async fn paged_list(
        &self,
        filter: &TaskDefinitionFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskDefinition>>;
}

/// 定时调度定义仓储（只读视图）
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn paged_list(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> Result<Paged<ScheduleDefinition>>;
}
