//! 任务派发核心
//!
//! Worker注册表、回调令牌、任务派发/终止状态机，以及领导者选举保护的定时调度器。

pub mod cron_utils;
pub mod lease;
pub mod scheduler;
pub mod srv_token;
pub mod task_dispatcher;
pub mod worker_registry;

pub use cron_utils::CronScheduler;
pub use lease::LeaseHandle;
pub use scheduler::{
    SchedulerLeader, SchedulerLeaderConfig, SchedulerState, StopReason, SCHEDULER_CALLER,
};
pub use srv_token::{SrvTokenAuthority, SrvTokenBinding};
pub use task_dispatcher::{TaskDispatcher, NOT_RUNNING_MESSAGE};
pub use worker_registry::WorkerRegistry;
