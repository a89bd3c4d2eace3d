use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use taskmesh_api::{create_app, TaskService};
use taskmesh_core::{
    models::SchedulerLeaseRecord,
    traits::{DistributedLock, ScheduleRepository},
    AppConfig, TaskMeshError,
};
use taskmesh_dispatcher::{
    SchedulerLeader, SchedulerLeaderConfig, SrvTokenAuthority, TaskDispatcher, WorkerRegistry,
};
use taskmesh_infrastructure::{
    DatabaseManager, HttpWorkerClient, RedisConnection, RedisDistributedLock, RedisTokenStore,
    RedisWorkerDiscovery, StaticAuthService,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度器
    Scheduler,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    service: Arc<TaskService>,
    lock: Arc<dyn DistributedLock>,
    schedules: Arc<dyn ScheduleRepository>,
    instance: String,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!(?mode, "初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("初始化数据库表结构失败")?;

        let redis = RedisConnection::connect(&config.redis)
            .await
            .context("连接Redis失败")?;

        let discovery = RedisWorkerDiscovery::new(
            redis.clone(),
            config.worker_key_prefix(),
            config.discovery.scan_count,
        );
        let tokens = Arc::new(SrvTokenAuthority::new(
            Arc::new(RedisTokenStore::new(redis.clone())),
            Duration::from_secs(config.dispatcher.srv_token_ttl_seconds),
        ));
        let worker_client = HttpWorkerClient::new(Duration::from_millis(
            config.dispatcher.worker_rpc_timeout_ms,
        ))
        .context("创建Worker客户端失败")?;

        let results = database.result_store();
        let definitions = database.task_definition_repository();
        let schedules = database.schedule_repository();

        let dispatcher = Arc::new(TaskDispatcher::new(
            Arc::new(WorkerRegistry::new(Arc::new(discovery))),
            tokens.clone(),
            results.clone(),
            definitions.clone(),
            Arc::new(worker_client),
            config.dispatcher.partition_granularity,
        ));
        let service = Arc::new(TaskService::new(
            dispatcher,
            tokens,
            results,
            definitions,
            schedules.clone(),
            Arc::new(StaticAuthService::from_config(&config.auth)),
        ));

        Ok(Self {
            mode,
            service,
            lock: Arc::new(RedisDistributedLock::new(redis)),
            schedules,
            instance: uuid::Uuid::new_v4().to_string(),
            config,
        })
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(mode = ?self.mode, "启动应用程序");

        match self.mode {
            AppMode::Scheduler => self.run_scheduler(shutdown_rx).await,
            AppMode::Api => self.run_api(shutdown_rx).await,
            AppMode::All => {
                if !self.config.scheduler.enabled {
                    warn!("调度器已在配置中禁用，仅运行API服务器");
                    return self.run_api(shutdown_rx).await;
                }
                let api_rx = shutdown_rx.resubscribe();
                tokio::try_join!(self.run_scheduler(shutdown_rx), self.run_api(api_rx))?;
                Ok(())
            }
        }
    }

    fn leader_config(&self) -> SchedulerLeaderConfig {
        SchedulerLeaderConfig {
            leader_key: self.config.leader_key(),
            lease_ttl: Duration::from_secs(self.config.scheduler.lease_ttl_seconds),
            page_size: self.config.scheduler.load_page_size,
            record: SchedulerLeaseRecord::new(local_ip(), self.instance.clone()),
        }
    }

    /// 竞选失败的实例保持热备，每个租约周期重试一次；赢得选举后租约丢失则退出
    async fn run_scheduler(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let retry_interval = Duration::from_secs(self.config.scheduler.lease_ttl_seconds);

        loop {
            let leader = SchedulerLeader::new(
                self.leader_config(),
                self.lock.clone(),
                self.schedules.clone(),
                self.service.clone(),
            );

            match leader.start().await {
                Ok(()) => {}
                Err(TaskMeshError::LeadershipNotAcquired { holder }) => {
                    info!(holder = %holder, "调度领导权由其他实例持有，进入热备");
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = tokio::time::sleep(retry_interval) => continue,
                    }
                }
                Err(e) => return Err(e).context("启动调度器失败"),
            }

            return tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("调度器收到关闭信号");
                    leader.stop().await.context("停止调度器失败")
                }
                outcome = leader.wait() => {
                    let reason = outcome.context("调度器异常停止")?;
                    info!(?reason, "调度器已停止");
                    Ok(())
                }
            };
        }
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let address = &self.config.api.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("绑定API监听地址失败: {address}"))?;
        info!(%address, "API服务器已启动");

        axum::serve(listener, create_app(self.service.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }
}

/// 本机出站地址，取不到时退回主机名
fn local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| {
            hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string())
        })
}
