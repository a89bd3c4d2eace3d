use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use taskmesh_core::{
    models::{
        PageRequest, Paged, ScheduleDefinition, ScheduleFilter, TaskDefinition,
        TaskDefinitionFilter,
    },
    traits::{ScheduleRepository, TaskDefinitionRepository},
    Result, TaskMeshError,
};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

/// PostgreSQL任务定义仓储
pub struct PostgresTaskDefinitionRepository {
    pool: PgPool,
}

impl PostgresTaskDefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_definitions (
                id BIGSERIAL PRIMARY KEY,
                codename VARCHAR(255) NOT NULL UNIQUE,
                formal_params TEXT NOT NULL DEFAULT '{}',
                description TEXT NOT NULL DEFAULT '',
                disabled BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 写入任务定义，供管理工具和测试使用
    pub async fn insert(
        &self,
        codename: &str,
        formal_params: &serde_json::Value,
        description: &str,
        disabled: bool,
    ) -> Result<TaskDefinition> {
        TaskDefinition::split_codename(codename)?;
        let row = sqlx::query(
            "INSERT INTO task_definitions (codename, formal_params, description, disabled) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(codename)
        .bind(MappingHelpers::json_to_text(formal_params)?)
        .bind(description)
        .bind(disabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                TaskMeshError::Validation(format!("任务代号已存在: {codename}"))
            }
            other => TaskMeshError::Database(other),
        })?;

        debug!(codename, "写入任务定义");
        Ok(TaskDefinition {
            id: row.try_get("id")?,
            codename: codename.to_string(),
            formal_params: formal_params.clone(),
            description: description.to_string(),
            disabled,
        })
    }

    fn row_to_definition(row: &sqlx::postgres::PgRow) -> Result<TaskDefinition> {
        let formal_params: String = row.try_get("formal_params")?;
        Ok(TaskDefinition {
            id: row.try_get("id")?,
            codename: row.try_get("codename")?,
            formal_params: MappingHelpers::text_to_json(&formal_params, "formal_params")?,
            description: row.try_get("description")?,
            disabled: row.try_get("disabled")?,
        })
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &TaskDefinitionFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(codename) = &filter.codename {
            builder
                .push(" AND codename LIKE ")
                .push_bind(MappingHelpers::like_pattern(codename))
                .push(" ESCAPE '\\'");
        }
        if let Some(modular) = &filter.modular {
            builder
                .push(" AND codename LIKE ")
                .push_bind(MappingHelpers::prefix_pattern(&format!("{modular}.")))
                .push(" ESCAPE '\\'");
        }
        if let Some(disabled) = filter.disabled {
            builder.push(" AND disabled = ").push_bind(disabled);
        }
    }
}

#[async_trait]
impl TaskDefinitionRepository for PostgresTaskDefinitionRepository {
    async fn get_by_codename(&self, codename: &str) -> Result<Option<TaskDefinition>> {
        let row = sqlx::query(
            "SELECT id, codename, formal_params, description, disabled \
             FROM task_definitions WHERE codename = $1",
        )
        .bind(codename)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_definition).transpose()
    }

    async fn paged_list(
        &self,
        filter: &TaskDefinitionFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskDefinition>> {
        let mut count_query =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM task_definitions");
        Self::push_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut list_query = QueryBuilder::<Postgres>::new(
            "SELECT id, codename, formal_params, description, disabled FROM task_definitions",
        );
        Self::push_filter(&mut list_query, filter);
        list_query
            .push(" ORDER BY codename ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = list_query.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_definition)
            .collect::<Result<Vec<_>>>()?;

        Ok(Paged::new(items, page, total))
    }
}

/// PostgreSQL定时调度定义仓储
pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_definitions (
                id BIGSERIAL PRIMARY KEY,
                expression VARCHAR(128) NOT NULL,
                arguments TEXT NOT NULL DEFAULT '{}',
                timeout_ms BIGINT NOT NULL,
                task_codename VARCHAR(255) NOT NULL,
                disabled BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert(
        &self,
        expression: &str,
        task_codename: &str,
        arguments: &serde_json::Value,
        timeout_ms: i64,
        disabled: bool,
    ) -> Result<ScheduleDefinition> {
        let row = sqlx::query(
            "INSERT INTO schedule_definitions (expression, arguments, timeout_ms, task_codename, disabled) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(expression)
        .bind(MappingHelpers::json_to_text(arguments)?)
        .bind(timeout_ms)
        .bind(task_codename)
        .bind(disabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(ScheduleDefinition {
            id: row.try_get("id")?,
            expression: expression.to_string(),
            arguments: arguments.clone(),
            timeout_ms,
            task_codename: task_codename.to_string(),
            disabled,
        })
    }

    fn row_to_schedule(row: &sqlx::postgres::PgRow) -> Result<ScheduleDefinition> {
        let arguments: String = row.try_get("arguments")?;
        Ok(ScheduleDefinition {
            id: row.try_get("id")?,
            expression: row.try_get("expression")?,
            arguments: MappingHelpers::text_to_json(&arguments, "arguments")?,
            timeout_ms: row.try_get("timeout_ms")?,
            task_codename: row.try_get("task_codename")?,
            disabled: row.try_get("disabled")?,
        })
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ScheduleFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(codename) = &filter.task_codename {
            builder.push(" AND task_codename = ").push_bind(codename.clone());
        }
        if let Some(disabled) = filter.disabled {
            builder.push(" AND disabled = ").push_bind(disabled);
        }
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    async fn paged_list(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> Result<Paged<ScheduleDefinition>> {
        let mut count_query =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM schedule_definitions");
        Self::push_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut list_query = QueryBuilder::<Postgres>::new(
            "SELECT id, expression, arguments, timeout_ms, task_codename, disabled FROM schedule_definitions",
        );
        Self::push_filter(&mut list_query, filter);
        list_query
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = list_query.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_schedule)
            .collect::<Result<Vec<_>>>()?;

        Ok(Paged::new(items, page, total))
    }
}
