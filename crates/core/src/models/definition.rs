use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaskMeshError};

/// 任务定义（由外部管理，调度核心只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: i64,
    /// `<modular>.<name>`
    pub codename: String,
    pub formal_params: serde_json::Value,
    pub description: String,
    pub disabled: bool,
}

impl TaskDefinition {
    /// 把任务代号拆成 `(modular, name)`，以第一个 `.` 为界，两段都不能为空
    pub fn split_codename(codename: &str) -> Result<(&str, &str)> {
        match codename.split_once('.') {
            Some((modular, name)) if !modular.is_empty() && !name.is_empty() => {
                Ok((modular, name))
            }
            _ => Err(TaskMeshError::Validation(format!(
                "任务代号必须是 modular.name 格式: {codename:?}"
            ))),
        }
    }
}

/// 定时调度定义（由外部管理，调度器启动时读取）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: i64,
    pub expression: String,
    pub arguments: serde_json::Value,
    pub timeout_ms: i64,
    pub task_codename: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinitionFilter {
    pub codename: Option<String>,
    pub modular: Option<String>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleFilter {
    pub task_codename: Option<String>,
    pub disabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_codename() {
        assert_eq!(
            TaskDefinition::split_codename("builtin.ping").unwrap(),
            ("builtin", "ping")
        );
        assert_eq!(
            TaskDefinition::split_codename("etl.daily.report").unwrap(),
            ("etl", "daily.report")
        );
        assert!(TaskDefinition::split_codename("nomodule").is_err());
        assert!(TaskDefinition::split_codename(".ping").is_err());
        assert!(TaskDefinition::split_codename("builtin.").is_err());
        assert!(TaskDefinition::split_codename("").is_err());
    }
}
