use std::sync::Arc;
use std::time::Duration;

use taskmesh_core::{
    config::models::DatabaseConfig,
    traits::{ResultStore, ScheduleRepository, TaskDefinitionRepository},
    Result,
};
use tracing::info;

use super::postgres::{
    PostgresResultStore, PostgresScheduleRepository, PostgresTaskDefinitionRepository,
};
use super::sqlite::{SqliteResultStore, SqliteScheduleRepository, SqliteTaskDefinitionRepository};

/// 根据连接串判断数据库类型
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let acquire_timeout = Duration::from_secs(config.connection_timeout_seconds);
        let idle_timeout = Duration::from_secs(config.idle_timeout_seconds);

        match DatabaseType::from_url(&config.url) {
            DatabaseType::PostgreSQL => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.url)
                    .await?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.url)
                    .await?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}

/// 统一的数据库入口，按连接串选择后端并构造各仓储
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = DatabasePool::new(config).await?;
        info!(database_type = ?pool.database_type(), "数据库连接池已建立");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// 创建分区元数据表与定义表；分区物理表按需创建
    pub async fn migrate(&self) -> Result<()> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                PostgresResultStore::new(pool.clone()).migrate().await?;
                PostgresTaskDefinitionRepository::new(pool.clone())
                    .migrate()
                    .await?;
                PostgresScheduleRepository::new(pool.clone()).migrate().await?;
            }
            DatabasePool::SQLite(pool) => {
                SqliteResultStore::new(pool.clone()).migrate().await?;
                SqliteTaskDefinitionRepository::new(pool.clone())
                    .migrate()
                    .await?;
                SqliteScheduleRepository::new(pool.clone()).migrate().await?;
            }
        }
        info!("数据库表结构已就绪");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn result_store(&self) -> Arc<dyn ResultStore> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresResultStore::new(pool.clone())),
            DatabasePool::SQLite(pool) => Arc::new(SqliteResultStore::new(pool.clone())),
        }
    }

    pub fn task_definition_repository(&self) -> Arc<dyn TaskDefinitionRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresTaskDefinitionRepository::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => {
                Arc::new(SqliteTaskDefinitionRepository::new(pool.clone()))
            }
        }
    }

    pub fn schedule_repository(&self) -> Arc<dyn ScheduleRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresScheduleRepository::new(pool.clone())),
            DatabasePool::SQLite(pool) => Arc::new(SqliteScheduleRepository::new(pool.clone())),
        }
    }
}
