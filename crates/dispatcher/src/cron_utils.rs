use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use taskmesh_core::{Result, TaskMeshError};

/// CRON表达式解析和调度工具
///
/// 接受两种写法：标准5段（分钟精度，自动补秒位 `0`）以及 `cron` crate
/// 原生的6/7段（带秒、可选年份）。
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> Result<Self> {
        let normalized = Self::normalize(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| TaskMeshError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: cron_expr.to_string(),
            schedule,
        })
    }

    fn normalize(cron_expr: &str) -> String {
        let trimmed = cron_expr.trim();
        if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}
