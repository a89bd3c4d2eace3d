//! 外部系统适配层：SQL结果存储与定义仓储、Redis协调后端、Worker RPC客户端、静态认证

pub mod auth;
pub mod coordination;
pub mod database;
pub mod worker_client;

pub use auth::StaticAuthService;
pub use coordination::{
    RedisConnection, RedisDistributedLock, RedisTokenStore, RedisWorkerDiscovery,
};
pub use database::{DatabaseManager, DatabasePool, DatabaseType};
pub use worker_client::HttpWorkerClient;
