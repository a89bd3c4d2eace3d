use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 调度器领导者记录，保存在全局唯一的租约键中
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerLeaseRecord {
    pub ip_address: String,
    pub start_time: DateTime<Utc>,
    /// 同一主机上多个进程之间的区分标识
    pub instance: String,
}

impl SchedulerLeaseRecord {
    pub fn new(ip_address: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            start_time: Utc::now(),
            instance: instance.into(),
        }
    }
}
