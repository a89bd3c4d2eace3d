//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//!
//! 1. 内置默认值
//! 2. TOML配置文件
//! 3. `TASKMESH__` 前缀的环境变量（层级以 `__` 分隔，例如 `TASKMESH__REDIS__URL`）

pub mod models;

pub use models::{
    ApiConfig, ApiKeyConfig, AppConfig, AuthConfig, DatabaseConfig, DiscoveryConfig,
    DispatcherConfig, ObservabilityConfig, RedisConfig, SchedulerConfig,
};
