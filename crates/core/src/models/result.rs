use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaskMeshError};

/// 任务执行结果状态
///
/// 整数取值是线上协议的一部分：所有终态都小于等于 [`ResultStatus::SUCCESS_END`]，
/// 非终态都大于它。判断是否终态请使用 [`ResultStatus::is_terminal`]，
/// 不要直接比较数值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum ResultStatus {
    Success = 1,
    Failure = 2,
    Killed = 3,
    Timeout = 4,
    CallError = 5,
    NoWorkerError = 6,
    Initialization = 101,
    Running = 102,
}

impl ResultStatus {
    /// 终态与非终态的分界值
    pub const SUCCESS_END: i32 = 100;

    pub const ALL: [ResultStatus; 8] = [
        ResultStatus::Success,
        ResultStatus::Failure,
        ResultStatus::Killed,
        ResultStatus::Timeout,
        ResultStatus::CallError,
        ResultStatus::NoWorkerError,
        ResultStatus::Initialization,
        ResultStatus::Running,
    ];

    pub fn is_terminal(&self) -> bool {
        match self {
            ResultStatus::Success
            | ResultStatus::Failure
            | ResultStatus::Killed
            | ResultStatus::Timeout
            | ResultStatus::CallError
            | ResultStatus::NoWorkerError => true,
            ResultStatus::Initialization | ResultStatus::Running => false,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_i32() == value)
            .ok_or_else(|| TaskMeshError::Validation(format!("未知的任务状态值: {value}")))
    }

    /// 校验 `self -> next` 的状态变更
    ///
    /// 终态不可再变更；任何状态都不能回到 `Initialization`。
    pub fn check_transition(&self, next: ResultStatus) -> Result<()> {
        if self.is_terminal() || next == ResultStatus::Initialization {
            return Err(TaskMeshError::InvalidTransition {
                from: format!("{self:?}"),
                to: format!("{next:?}"),
            });
        }
        Ok(())
    }
}

impl TryFrom<i32> for ResultStatus {
    type Error = TaskMeshError;

    fn try_from(value: i32) -> Result<Self> {
        Self::from_i32(value)
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl sqlx::Type<sqlx::Sqlite> for ResultStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i32 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i32 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ResultStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let v = <i32 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        ResultStatus::from_i32(v).map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ResultStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i32 as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_i32(), buf)
    }
}

impl sqlx::Type<sqlx::Postgres> for ResultStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i32 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i32 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ResultStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let v = <i32 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        ResultStatus::from_i32(v).map_err(|e| e.to_string().into())
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for ResultStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i32 as sqlx::Encode<sqlx::Postgres>>::encode(self.as_i32(), buf)
    }
}

/// 一次任务调用的执行记录，存放在 `start_at` 所属的分区表中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: i64,
    pub task_codename: String,
    pub status: ResultStatus,
    pub caller: String,
    pub worker: Option<String>,
    pub timeout_ms: i64,
    pub arguments: serde_json::Value,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

/// 新建执行记录时的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskResult {
    pub task_codename: String,
    pub caller: String,
    pub timeout_ms: i64,
    pub arguments: serde_json::Value,
    pub start_at: DateTime<Utc>,
}

/// 任务日志，追加写入，与所属结果在同一分区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    pub result_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 执行记录查询条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultFilter {
    pub task_codename: Option<String>,
    pub status: Option<ResultStatus>,
    pub caller: Option<String>,
}
