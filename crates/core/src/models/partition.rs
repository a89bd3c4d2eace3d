use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaskMeshError};

/// 分区标签最大长度（会拼接进物理表名）
pub const MAX_PARTITION_LABEL_LEN: usize = 32;

/// 结果/日志表的时间分区
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: i64,
    pub partition_label: String,
}

impl Partition {
    /// 分区标签只允许ASCII字母、数字和下划线
    pub fn validate_label(label: &str) -> Result<()> {
        if label.is_empty() || label.len() > MAX_PARTITION_LABEL_LEN {
            return Err(TaskMeshError::Validation(format!(
                "分区标签长度非法: {label:?}"
            )));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(TaskMeshError::Validation(format!(
                "分区标签包含非法字符: {label:?}"
            )));
        }
        Ok(())
    }
}

/// 分区粒度，决定 `start_at` 落到哪个分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionGranularity {
    #[default]
    Year,
    Month,
    Day,
}

impl PartitionGranularity {
    pub fn label_for(&self, at: DateTime<Utc>) -> String {
        let pattern = match self {
            PartitionGranularity::Year => "%Y",
            PartitionGranularity::Month => "%Y%m",
            PartitionGranularity::Day => "%Y%m%d",
        };
        at.format(pattern).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_label_for_granularity() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap();
        assert_eq!(PartitionGranularity::Year.label_for(at), "2024");
        assert_eq!(PartitionGranularity::Month.label_for(at), "202401");
        assert_eq!(PartitionGranularity::Day.label_for(at), "20240115");
    }

    #[test]
    fn test_validate_label() {
        assert!(Partition::validate_label("2024").is_ok());
        assert!(Partition::validate_label("p_2024").is_ok());
        assert!(Partition::validate_label("").is_err());
        assert!(Partition::validate_label("2024::1").is_err());
        assert!(Partition::validate_label("2024; DROP TABLE x").is_err());
        assert!(Partition::validate_label(&"9".repeat(MAX_PARTITION_LABEL_LEN + 1)).is_err());
    }
}
