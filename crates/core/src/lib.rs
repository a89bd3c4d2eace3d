pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use logging::{init_logging, LogFormat};

/// 统一的Result类型
pub type TaskMeshResult<T> = std::result::Result<T, TaskMeshError>;
