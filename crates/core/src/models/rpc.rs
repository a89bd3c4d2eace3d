use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 携带回调令牌的HTTP头
pub const SRV_TOKEN_HEADER: &str = "x-srv-token";
/// 回调成功后返回轮换令牌的HTTP头
pub const NEXT_SRV_TOKEN_HEADER: &str = "x-next-srv-token";

/// 发往Worker的任务调用请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCallTaskRequest {
    pub name: String,
    pub task_unique_id: String,
    pub arguments: serde_json::Value,
    pub timeout_ms: i64,
    pub caller: String,
    pub start_timestamp: DateTime<Utc>,
}

/// 发往Worker的终止请求，仅为信号，最终状态由Worker回报
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerKillTaskRequest {
    pub task_unique_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Worker对调用的应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAck {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl WorkerAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}
