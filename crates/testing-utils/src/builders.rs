//! Test data builders with sensible defaults

use chrono::{DateTime, Utc};
use taskmesh_core::models::{
    ResultStatus, ScheduleDefinition, TaskDefinition, TaskResult, WorkerInfo,
};

/// Builder for TaskResult rows
pub struct TaskResultBuilder {
    result: TaskResult,
}

impl TaskResultBuilder {
    pub fn new() -> Self {
        Self {
            result: TaskResult {
                id: 1,
                task_codename: "builtin.ping".to_string(),
                status: ResultStatus::Initialization,
                caller: "test".to_string(),
                worker: None,
                timeout_ms: 5000,
                arguments: serde_json::json!({}),
                start_at: Utc::now(),
                end_at: None,
            },
        }
    }

    pub fn with_codename(mut self, codename: &str) -> Self {
        self.result.task_codename = codename.to_string();
        self
    }

    pub fn with_status(mut self, status: ResultStatus) -> Self {
        self.result.status = status;
        self
    }

    pub fn with_worker(mut self, worker_id: &str) -> Self {
        self.result.worker = Some(worker_id.to_string());
        self
    }

    pub fn with_caller(mut self, caller: &str) -> Self {
        self.result.caller = caller.to_string();
        self
    }

    pub fn with_start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.result.start_at = start_at;
        self
    }

    /// Running on the given worker
    pub fn running_on(self, worker_id: &str) -> Self {
        self.with_status(ResultStatus::Running).with_worker(worker_id)
    }

    pub fn build(self) -> TaskResult {
        self.result
    }
}

impl Default for TaskResultBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScheduleBuilder {
    schedule: ScheduleDefinition,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        Self {
            schedule: ScheduleDefinition {
                id: 1,
                expression: "* * * * * *".to_string(),
                arguments: serde_json::json!({}),
                timeout_ms: 1000,
                task_codename: "builtin.ping".to_string(),
                disabled: false,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.schedule.id = id;
        self
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.schedule.expression = expression.to_string();
        self
    }

    pub fn with_codename(mut self, codename: &str) -> Self {
        self.schedule.task_codename = codename.to_string();
        self
    }

    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.schedule.arguments = arguments;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.schedule.timeout_ms = timeout_ms;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.schedule.disabled = true;
        self
    }

    pub fn build(self) -> ScheduleDefinition {
        self.schedule
    }
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn task_definition(codename: &str, disabled: bool) -> TaskDefinition {
    TaskDefinition {
        id: 1,
        codename: codename.to_string(),
        formal_params: serde_json::json!({}),
        description: String::new(),
        disabled,
    }
}

pub fn worker(worker_id: &str, modular: &str) -> WorkerInfo {
    WorkerInfo::new(worker_id, modular, format!("{worker_id}.local:9000"))
}
