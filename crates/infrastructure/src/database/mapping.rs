//! 行映射辅助函数，SQLite与PostgreSQL共用
//!
//! JSON字段在两种数据库中都以TEXT存储。

use taskmesh_core::{Result, TaskMeshError};

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn json_to_text(value: &serde_json::Value) -> Result<String> {
        serde_json::to_string(value)
            .map_err(|e| TaskMeshError::Serialization(format!("序列化JSON字段失败: {e}")))
    }

    pub fn text_to_json(text: &str, field_name: &str) -> Result<serde_json::Value> {
        serde_json::from_str(text).map_err(|e| {
            TaskMeshError::Serialization(format!("解析JSON字段 {field_name} 失败: {e}"))
        })
    }

    fn escape_like(raw: &str) -> String {
        raw.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }

    /// `%pattern%` 形式的模糊匹配参数，转义通配符
    pub fn like_pattern(raw: &str) -> String {
        format!("%{}%", Self::escape_like(raw))
    }

    /// 前缀匹配参数
    pub fn prefix_pattern(prefix: &str) -> String {
        format!("{}%", Self::escape_like(prefix))
    }
}

/// 分区物理表命名
pub struct PartitionTables {
    pub results: String,
    pub logs: String,
}

impl PartitionTables {
    pub const RESULT_BASE: &'static str = "task_results_";
    pub const LOG_BASE: &'static str = "task_logs_";

    /// 标签会被拼接进SQL标识符，必须先通过校验
    pub fn for_label(label: &str) -> Result<Self> {
        taskmesh_core::models::Partition::validate_label(label)?;
        Ok(Self {
            results: format!("{}{label}", Self::RESULT_BASE),
            logs: format!("{}{label}", Self::LOG_BASE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_table_names() {
        let tables = PartitionTables::for_label("2024").unwrap();
        assert_eq!(tables.results, "task_results_2024");
        assert_eq!(tables.logs, "task_logs_2024");
        assert!(PartitionTables::for_label("2024\"; DROP TABLE x; --").is_err());
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(MappingHelpers::like_pattern("ping"), "%ping%");
        assert_eq!(MappingHelpers::like_pattern("a_b%"), "%a\\_b\\%%");
        assert_eq!(MappingHelpers::prefix_pattern("etl_v2."), "etl\\_v2.%");
    }

    #[test]
    fn test_json_text() {
        let value = serde_json::json!({"n": 1});
        let text = MappingHelpers::json_to_text(&value).unwrap();
        assert_eq!(MappingHelpers::text_to_json(&text, "arguments").unwrap(), value);
        assert!(MappingHelpers::text_to_json("{", "arguments").is_err());
    }
}
