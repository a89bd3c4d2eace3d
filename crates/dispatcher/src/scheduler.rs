//! 领导者选举保护的定时调度器
//!
//! 生命周期：`Unstarted → Loading → LeaderPending → Running → Stopped`。
//!
//! 启动时先完整加载所有启用的调度定义（任何加载错误都是致命的），再竞争全局领导者键，
//! 只有赢得选举的实例才会注册定时触发器。租约丢失后不会自动重新选举，调度器直接进入
//! `Stopped` 并通过 [`SchedulerLeader::wait`] 报告 `LeadershipLost`。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use taskmesh_core::{
    models::{PageRequest, ScheduleDefinition, ScheduleFilter, SchedulerLeaseRecord},
    traits::{DistributedLock, ScheduleRepository, TaskCaller},
    Result, TaskMeshError,
};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cron_utils::CronScheduler;
use crate::lease::LeaseHandle;

/// 定时触发时使用的调用方名称
pub const SCHEDULER_CALLER: &str = "scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unstarted,
    Loading,
    LeaderPending,
    Running,
    Stopped,
}

/// 调度器停止的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    LeadershipLost,
    StartFailed,
}

#[derive(Debug, Clone)]
pub struct SchedulerLeaderConfig {
    pub leader_key: String,
    pub lease_ttl: Duration,
    pub page_size: i64,
    pub record: SchedulerLeaseRecord,
}

struct CronJob {
    schedule: ScheduleDefinition,
    cron: CronScheduler,
}

pub struct SchedulerLeader {
    config: SchedulerLeaderConfig,
    lock: Arc<dyn DistributedLock>,
    schedules: Arc<dyn ScheduleRepository>,
    caller: Arc<dyn TaskCaller>,
    state_tx: Arc<watch::Sender<SchedulerState>>,
    outcome_tx: Arc<watch::Sender<Option<StopReason>>>,
    stop_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerLeader {
    pub fn new(
        config: SchedulerLeaderConfig,
        lock: Arc<dyn DistributedLock>,
        schedules: Arc<dyn ScheduleRepository>,
        caller: Arc<dyn TaskCaller>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Unstarted);
        let (outcome_tx, _) = watch::channel(None);
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            lock,
            schedules,
            caller,
            state_tx: Arc::new(state_tx),
            outcome_tx: Arc::new(outcome_tx),
            stop_tx,
            supervisor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SchedulerState) {
        debug!(?state, "调度器状态变更");
        self.state_tx.send_replace(state);
    }

    fn abort_start(&self, err: TaskMeshError) -> TaskMeshError {
        self.set_state(SchedulerState::Stopped);
        self.outcome_tx.send_replace(Some(StopReason::StartFailed));
        err
    }

    /// 加载调度定义、竞选领导者并注册触发器
    ///
    /// 选举失败返回 `LeadershipNotAcquired`，此时不会注册任何触发器。
    pub async fn start(&self) -> Result<()> {
        let claimed = self.state_tx.send_if_modified(|state| {
            if *state == SchedulerState::Unstarted {
                *state = SchedulerState::Loading;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(TaskMeshError::Validation(format!(
                "调度器只能启动一次，当前状态: {:?}",
                self.state()
            )));
        }

        let jobs = match self.load_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "加载调度定义失败，调度器停止");
                return Err(self.abort_start(e));
            }
        };

        if *self.stop_tx.borrow() {
            info!("加载期间收到停止请求，放弃竞选");
            self.set_state(SchedulerState::Stopped);
            self.outcome_tx.send_replace(Some(StopReason::Shutdown));
            return Err(TaskMeshError::Validation("调度器已被停止".to_string()));
        }

        self.set_state(SchedulerState::LeaderPending);
        let record = serde_json::to_string(&self.config.record)
            .map_err(|e| self.abort_start(e.into()))?;
        let lease = match LeaseHandle::acquire(
            self.lock.clone(),
            &self.config.leader_key,
            &record,
            self.config.lease_ttl,
        )
        .await
        {
            Ok(lease) => lease,
            Err(e) => {
                warn!(key = %self.config.leader_key, error = %e, "未能成为调度领导者");
                return Err(self.abort_start(e));
            }
        };

        let mut triggers = JoinSet::new();
        for job in jobs {
            triggers.spawn(run_trigger(job, self.caller.clone()));
        }
        info!(
            key = %self.config.leader_key,
            ip_address = %self.config.record.ip_address,
            instance = %self.config.record.instance,
            triggers = triggers.len(),
            "成为调度领导者，开始触发定时任务"
        );
        self.set_state(SchedulerState::Running);

        let handle = tokio::spawn(supervise(
            lease,
            triggers,
            self.stop_tx.subscribe(),
            self.state_tx.clone(),
            self.outcome_tx.clone(),
        ));
        if let Ok(mut supervisor) = self.supervisor.lock() {
            *supervisor = Some(handle);
        }
        Ok(())
    }

    async fn load_jobs(&self) -> Result<Vec<CronJob>> {
        let filter = ScheduleFilter {
            disabled: Some(false),
            ..Default::default()
        };
        let mut jobs = Vec::new();
        let mut page = 1;
        loop {
            let paged = self
                .schedules
                .paged_list(&filter, PageRequest::new(page, self.config.page_size))
                .await?;
            for schedule in paged.items.iter().cloned() {
                let cron = CronScheduler::new(&schedule.expression).inspect_err(|e| {
                    error!(
                        schedule_id = schedule.id,
                        codename = %schedule.task_codename,
                        error = %e,
                        "调度定义的CRON表达式无效"
                    );
                })?;
                jobs.push(CronJob { schedule, cron });
            }
            if paged.is_last_page() {
                break;
            }
            page += 1;
        }
        info!(count = jobs.len(), "加载调度定义完成");
        Ok(jobs)
    }

    /// 停止触发器并释放领导者租约
    ///
    /// `start` 仍在加载或竞选时会等它收尾，返回时本实例一定不再持有租约。
    pub async fn stop(&self) -> Result<()> {
        self.stop_tx.send_replace(true);
        let never_started = self.state_tx.send_if_modified(|state| {
            if *state == SchedulerState::Unstarted {
                *state = SchedulerState::Stopped;
                true
            } else {
                false
            }
        });
        if never_started {
            self.outcome_tx.send_replace(Some(StopReason::Shutdown));
            return Ok(());
        }
        let handle = match self.supervisor.lock() {
            Ok(mut supervisor) => supervisor.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| TaskMeshError::Internal(format!("调度器监督任务异常退出: {e}")))?;
        }

        let mut outcome_rx = self.outcome_tx.subscribe();
        if outcome_rx.wait_for(Option::is_some).await.is_err() {
            return Err(TaskMeshError::Internal("调度器状态通道已关闭".to_string()));
        }
        Ok(())
    }

    /// 等待调度器停止；因租约丢失而停止时返回 `LeadershipLost`
    pub async fn wait(&self) -> Result<StopReason> {
        if self.state() == SchedulerState::Unstarted {
            return Err(TaskMeshError::Validation("调度器尚未启动".to_string()));
        }
        let mut outcome_rx = self.outcome_tx.subscribe();
        let reason = match outcome_rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };
        match reason {
            Some(StopReason::LeadershipLost) => Err(TaskMeshError::LeadershipLost),
            Some(reason) => Ok(reason),
            None => Err(TaskMeshError::Internal("调度器状态通道已关闭".to_string())),
        }
    }
}

async fn supervise(
    lease: LeaseHandle,
    mut triggers: JoinSet<()>,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: Arc<watch::Sender<SchedulerState>>,
    outcome_tx: Arc<watch::Sender<Option<StopReason>>>,
) {
    let mut lost_rx = lease.lost_signal();
    let reason = tokio::select! {
        _ = async { let _ = lost_rx.wait_for(|lost| *lost).await; } => StopReason::LeadershipLost,
        _ = async { let _ = stop_rx.wait_for(|stop| *stop).await; } => StopReason::Shutdown,
    };

    triggers.shutdown().await;
    match reason {
        StopReason::LeadershipLost => {
            error!(key = %lease.key(), "领导者租约丢失，停止所有定时触发器");
            lease.abandon().await;
        }
        _ => {
            if let Err(e) = lease.release().await {
                warn!(error = %e, "释放领导者租约失败");
            }
            info!("调度器已停止");
        }
    }

    state_tx.send_replace(SchedulerState::Stopped);
    outcome_tx.send_replace(Some(reason));
}

async fn run_trigger(job: CronJob, caller: Arc<dyn TaskCaller>) {
    let schedule = &job.schedule;
    let mut last_fire = Utc::now();
    loop {
        let from = Utc::now().max(last_fire);
        let Some(next) = job.cron.next_execution_time(from) else {
            warn!(
                schedule_id = schedule.id,
                expression = %job.cron.expression(),
                "CRON表达式没有后续触发时间"
            );
            return;
        };
        let delay = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;
        last_fire = next;

        match caller
            .call_task(
                &schedule.task_codename,
                schedule.arguments.clone(),
                SCHEDULER_CALLER,
                schedule.timeout_ms,
            )
            .await
        {
            Ok(task_unique_id) => info!(
                schedule_id = schedule.id,
                codename = %schedule.task_codename,
                %task_unique_id,
                "定时任务已触发"
            ),
            Err(e) => error!(
                schedule_id = schedule.id,
                codename = %schedule.task_codename,
                error = %e,
                "定时任务触发失败"
            ),
        }
    }
}
