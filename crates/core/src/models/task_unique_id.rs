use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::partition::Partition;
use crate::errors::{Result, TaskMeshError};

/// 分区标签与结果ID之间的分隔符，分区标签中不允许出现
pub const TASK_UNIQUE_ID_SEPARATOR: &str = "::";

/// 对外暴露的任务唯一标识: `<partitionLabel>::<resultId>`
///
/// 这是Worker与调用方唯一能拿到的任务标识。解码严格失败，从不猜测。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskUniqueId {
    partition_label: String,
    result_id: i64,
}

impl TaskUniqueId {
    pub fn new(partition_label: impl Into<String>, result_id: i64) -> Result<Self> {
        let partition_label = partition_label.into();
        Partition::validate_label(&partition_label)?;
        if result_id < 0 {
            return Err(TaskMeshError::Validation(format!(
                "结果ID不能为负数: {result_id}"
            )));
        }
        Ok(Self {
            partition_label,
            result_id,
        })
    }

    pub fn partition_label(&self) -> &str {
        &self.partition_label
    }

    pub fn result_id(&self) -> i64 {
        self.result_id
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            self.partition_label, TASK_UNIQUE_ID_SEPARATOR, self.result_id
        )
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let malformed = || TaskMeshError::Validation(format!("无效的任务标识: {raw:?}"));

        let mut parts = raw.split(TASK_UNIQUE_ID_SEPARATOR);
        let (Some(label), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed());
        };
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let result_id = id.parse::<i64>().map_err(|_| malformed())?;

        Self::new(label, result_id).map_err(|_| malformed())
    }
}

impl fmt::Display for TaskUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for TaskUniqueId {
    type Err = TaskMeshError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl TryFrom<String> for TaskUniqueId {
    type Error = TaskMeshError;

    fn try_from(value: String) -> Result<Self> {
        Self::decode(&value)
    }
}

impl From<TaskUniqueId> for String {
    fn from(value: TaskUniqueId) -> Self {
        value.encode()
    }
}
