pub mod api_observability;
pub mod app_config;
pub mod coordination;
pub mod database;
pub mod dispatcher_scheduler;

pub use api_observability::{ApiConfig, ApiKeyConfig, AuthConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use coordination::{DiscoveryConfig, RedisConfig};
pub use database::DatabaseConfig;
pub use dispatcher_scheduler::{DispatcherConfig, SchedulerConfig};
