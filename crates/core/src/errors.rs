use thiserror::Error;

/// 平台错误类型定义
///
/// 每个变体都对应一个稳定的错误码（见 [`TaskMeshError::code`]），
/// 错误码会原样返回给RPC调用方，不随错误消息的措辞变化。
#[derive(Debug, Error)]
pub enum TaskMeshError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("没有可用的Worker: {0}")]
    NoWorkerAvailable(String),

    #[error("任务分发失败: {0}")]
    DispatchFailure(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("存储操作错误: {0}")]
    Storage(String),

    #[error("协调服务错误: {0}")]
    Coordination(String),

    #[error("认证失败: {0}")]
    Auth(String),

    #[error("权限不足: {0}")]
    Forbidden(String),

    #[error("非法的状态变更: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("未能获得调度领导权, 当前持有者: {holder}")]
    LeadershipNotAcquired { holder: String },

    #[error("失去领导权")]
    LeadershipLost,

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl TaskMeshError {
    /// 稳定的错误码
    pub fn code(&self) -> &'static str {
        match self {
            TaskMeshError::Validation(_) => "VALIDATION_ERROR",
            TaskMeshError::NotFound(_) => "NOT_FOUND",
            TaskMeshError::NoWorkerAvailable(_) => "NO_WORKER_AVAILABLE",
            TaskMeshError::DispatchFailure(_) => "DISPATCH_FAILURE",
            TaskMeshError::Database(_) | TaskMeshError::Storage(_) => "STORAGE_FAILURE",
            TaskMeshError::Coordination(_) => "COORDINATION_FAILURE",
            TaskMeshError::Auth(_) => "AUTH_FAILURE",
            TaskMeshError::Forbidden(_) => "FORBIDDEN",
            TaskMeshError::InvalidTransition { .. } => "INVALID_TRANSITION",
            TaskMeshError::LeadershipNotAcquired { .. } => "LEADERSHIP_NOT_ACQUIRED",
            TaskMeshError::LeadershipLost => "LEADERSHIP_LOST",
            TaskMeshError::InvalidCron { .. } => "INVALID_CRON",
            TaskMeshError::Serialization(_) => "SERIALIZATION_ERROR",
            TaskMeshError::Configuration(_) => "CONFIGURATION_ERROR",
            TaskMeshError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskMeshError::NotFound(_))
    }
}

impl From<redis::RedisError> for TaskMeshError {
    fn from(e: redis::RedisError) -> Self {
        TaskMeshError::Coordination(e.to_string())
    }
}

impl From<serde_json::Error> for TaskMeshError {
    fn from(e: serde_json::Error) -> Self {
        TaskMeshError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, TaskMeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            TaskMeshError::Validation("x".into()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(TaskMeshError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(
            TaskMeshError::NoWorkerAvailable("x".into()).code(),
            "NO_WORKER_AVAILABLE"
        );
        assert_eq!(
            TaskMeshError::DispatchFailure("x".into()).code(),
            "DISPATCH_FAILURE"
        );
        assert_eq!(TaskMeshError::Storage("x".into()).code(), "STORAGE_FAILURE");
        assert_eq!(
            TaskMeshError::Database(sqlx::Error::RowNotFound).code(),
            "STORAGE_FAILURE"
        );
        assert_eq!(TaskMeshError::Auth("x".into()).code(), "AUTH_FAILURE");
    }

    #[test]
    fn test_error_message_keeps_detail() {
        let err = TaskMeshError::Validation("task is not in running status".into());
        assert!(err.to_string().contains("task is not in running status"));

        let err = TaskMeshError::InvalidTransition {
            from: "Success".into(),
            to: "Running".into(),
        };
        assert!(err.to_string().contains("Success -> Running"));
    }
}
