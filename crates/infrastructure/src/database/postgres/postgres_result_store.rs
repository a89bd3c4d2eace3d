use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use taskmesh_core::{
    models::{
        NewTaskResult, PageRequest, Paged, Partition, ResultFilter, ResultStatus, TaskLog,
        TaskResult,
    },
    traits::ResultStore,
    Result, TaskMeshError,
};
use tracing::{debug, info, warn};

use crate::database::mapping::{MappingHelpers, PartitionTables};

const RESULT_COLUMNS: &str =
    "id, task_codename, status, caller, worker, timeout_ms, arguments, start_at, end_at";

pub struct PostgresResultStore {
    pool: PgPool,
}

impl PostgresResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 创建分区元数据表
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_partitions (
                id BIGSERIAL PRIMARY KEY,
                partition_label VARCHAR(32) NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_result(row: &sqlx::postgres::PgRow) -> Result<TaskResult> {
        let arguments: String = row.try_get("arguments")?;
        Ok(TaskResult {
            id: row.try_get("id")?,
            task_codename: row.try_get("task_codename")?,
            status: row.try_get("status")?,
            caller: row.try_get("caller")?,
            worker: row.try_get("worker")?,
            timeout_ms: row.try_get("timeout_ms")?,
            arguments: MappingHelpers::text_to_json(&arguments, "arguments")?,
            start_at: row.try_get("start_at")?,
            end_at: row.try_get("end_at")?,
        })
    }

    fn row_to_log(row: &sqlx::postgres::PgRow) -> Result<TaskLog> {
        Ok(TaskLog {
            id: row.try_get("id")?,
            result_id: row.try_get("result_id")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_partition(row: &sqlx::postgres::PgRow) -> Result<Partition> {
        Ok(Partition {
            id: row.try_get("id")?,
            partition_label: row.try_get("partition_label")?,
        })
    }

    fn push_result_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ResultFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(codename) = &filter.task_codename {
            builder.push(" AND task_codename = ").push_bind(codename.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(caller) = &filter.caller {
            builder.push(" AND caller = ").push_bind(caller.clone());
        }
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn create_partition(&self, label: &str) -> Result<Partition> {
        let tables = PartitionTables::for_label(label)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO task_partitions (partition_label, created_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(label)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                TaskMeshError::Validation(format!("分区已存在: {label}"))
            }
            other => TaskMeshError::Database(other),
        })?;
        let id: i64 = row.try_get("id")?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                task_codename VARCHAR(255) NOT NULL,
                status INTEGER NOT NULL,
                caller VARCHAR(255) NOT NULL,
                worker VARCHAR(255),
                timeout_ms BIGINT NOT NULL,
                arguments TEXT NOT NULL,
                start_at TIMESTAMPTZ NOT NULL,
                end_at TIMESTAMPTZ
            )
            "#,
            tables.results
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                result_id BIGINT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            tables.logs
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_result_id ON {0} (result_id)",
            tables.logs
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(partition = label, partition_id = id, "创建分区成功");
        Ok(Partition {
            id,
            partition_label: label.to_string(),
        })
    }

    async fn ensure_partition(&self, label: &str) -> Result<Partition> {
        if let Some(partition) = self.get_partition(label).await? {
            return Ok(partition);
        }
        match self.create_partition(label).await {
            Ok(partition) => Ok(partition),
            Err(TaskMeshError::Validation(_)) => {
                // 并发创建时输给了另一方，读取胜者写入的记录
                debug!(partition = label, "分区已被并发创建");
                self.get_partition(label)
                    .await?
                    .ok_or_else(|| TaskMeshError::Storage(format!("分区 {label} 创建后不可见")))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_partition(&self, label: &str) -> Result<Option<Partition>> {
        let row = sqlx::query("SELECT id, partition_label FROM task_partitions WHERE partition_label = $1")
            .bind(label)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_partition).transpose()
    }

    async fn resolve_partition_label(&self, partition_id: i64) -> Result<String> {
        let row = sqlx::query("SELECT partition_label FROM task_partitions WHERE id = $1")
            .bind(partition_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("partition_label")?),
            None => Err(TaskMeshError::NotFound(format!("分区 {partition_id}"))),
        }
    }

    async fn list_partitions(&self) -> Result<Vec<Partition>> {
        let rows = sqlx::query("SELECT id, partition_label FROM task_partitions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_partition).collect()
    }

    async fn new_result(&self, label: &str, result: &NewTaskResult) -> Result<TaskResult> {
        let tables = PartitionTables::for_label(label)?;
        let arguments = MappingHelpers::json_to_text(&result.arguments)?;

        let row = sqlx::query(&format!(
            "INSERT INTO {} (task_codename, status, caller, worker, timeout_ms, arguments, start_at, end_at) \
             VALUES ($1, $2, $3, NULL, $4, $5, $6, NULL) RETURNING {RESULT_COLUMNS}",
            tables.results
        ))
        .bind(&result.task_codename)
        .bind(ResultStatus::Initialization)
        .bind(&result.caller)
        .bind(result.timeout_ms)
        .bind(arguments)
        .bind(result.start_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_result(&row)
    }

    async fn get_result(&self, label: &str, result_id: i64) -> Result<Option<TaskResult>> {
        let tables = PartitionTables::for_label(label)?;
        if self.get_partition(label).await?.is_none() {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {RESULT_COLUMNS} FROM {} WHERE id = $1",
            tables.results
        ))
        .bind(result_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_result).transpose()
    }

    async fn set_result_status(
        &self,
        label: &str,
        result_id: i64,
        status: ResultStatus,
    ) -> Result<()> {
        let tables = PartitionTables::for_label(label)?;
        let end_at = status.is_terminal().then(Utc::now);
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = $1, end_at = COALESCE($2, end_at) \
             WHERE id = $3 AND status > $4",
            tables.results
        ))
        .bind(status)
        .bind(end_at)
        .bind(result_id)
        .bind(ResultStatus::SUCCESS_END)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // 记录存在但已是终态
            let current = self
                .get_result(label, result_id)
                .await?
                .ok_or_else(|| TaskMeshError::NotFound(format!("结果 {label}::{result_id}")))?;
            warn!(partition = label, result_id, from = %current.status, to = %status, "终态不可覆盖");
            return Err(TaskMeshError::InvalidTransition {
                from: format!("{:?}", current.status),
                to: format!("{status:?}"),
            });
        }
        debug!(partition = label, result_id, status = %status, "更新任务状态");
        Ok(())
    }

    async fn set_result_worker(&self, label: &str, result_id: i64, worker_id: &str) -> Result<()> {
        let tables = PartitionTables::for_label(label)?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET worker = $1 WHERE id = $2",
            tables.results
        ))
        .bind(worker_id)
        .bind(result_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TaskMeshError::NotFound(format!("结果 {label}::{result_id}")));
        }
        Ok(())
    }

    async fn mark_dispatched(&self, label: &str, result_id: i64, worker_id: &str) -> Result<()> {
        let tables = PartitionTables::for_label(label)?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET worker = $1, \
             status = CASE WHEN status = $2 THEN $3 ELSE status END \
             WHERE id = $4",
            tables.results
        ))
        .bind(worker_id)
        .bind(ResultStatus::Initialization)
        .bind(ResultStatus::Running)
        .bind(result_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(partition = label, result_id, "标记分发时结果记录不存在");
            return Err(TaskMeshError::NotFound(format!("结果 {label}::{result_id}")));
        }
        Ok(())
    }

    async fn paged_list_results(
        &self,
        label: &str,
        filter: &ResultFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskResult>> {
        let tables = PartitionTables::for_label(label)?;
        if self.get_partition(label).await?.is_none() {
            return Ok(Paged::new(Vec::new(), page, 0));
        }

        let mut count_query = QueryBuilder::<Postgres>::new(format!(
            "SELECT COUNT(*) AS total FROM {}",
            tables.results
        ));
        Self::push_result_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut list_query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {RESULT_COLUMNS} FROM {}",
            tables.results
        ));
        Self::push_result_filter(&mut list_query, filter);
        list_query
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = list_query.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(Self::row_to_result).collect::<Result<Vec<_>>>()?;

        Ok(Paged::new(items, page, total))
    }

    async fn new_log(&self, label: &str, result_id: i64, content: &str) -> Result<TaskLog> {
        let tables = PartitionTables::for_label(label)?;
        let row = sqlx::query(&format!(
            "INSERT INTO {} (result_id, content, created_at) VALUES ($1, $2, $3) \
             RETURNING id, result_id, content, created_at",
            tables.logs
        ))
        .bind(result_id)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_log(&row)
    }

    async fn list_logs(
        &self,
        label: &str,
        result_id: i64,
        page: PageRequest,
    ) -> Result<Paged<TaskLog>> {
        let tables = PartitionTables::for_label(label)?;
        if self.get_partition(label).await?.is_none() {
            return Ok(Paged::new(Vec::new(), page, 0));
        }

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) AS total FROM {} WHERE result_id = $1",
            tables.logs
        ))
        .bind(result_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT id, result_id, content, created_at FROM {} WHERE result_id = $1 \
             ORDER BY id ASC LIMIT $2 OFFSET $3",
            tables.logs
        ))
        .bind(result_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let items = rows.iter().map(Self::row_to_log).collect::<Result<Vec<_>>>()?;

        Ok(Paged::new(items, page, total))
    }
}
