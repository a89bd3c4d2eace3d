//! 可续约租约
//!
//! 在 [`DistributedLock`] 之上实现 `acquire(key, ttl) -> (handle, lost_signal)`：
//! 获得租约后后台每 `ttl/3` 续约一次，续约失败或租约被他人占有时翻转丢失信号。

use std::sync::Arc;
use std::time::Duration;

use taskmesh_core::{
    traits::{AcquireOutcome, DistributedLock},
    Result, TaskMeshError,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct LeaseHandle {
    lock: Arc<dyn DistributedLock>,
    key: String,
    token: String,
    lost_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
    keeper: Option<JoinHandle<()>>,
}

impl LeaseHandle {
    /// 尝试获得租约；键已被持有时返回 `LeadershipNotAcquired`
    pub async fn acquire(
        lock: Arc<dyn DistributedLock>,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Self> {
        let token = match lock.try_acquire(key, value, ttl).await? {
            AcquireOutcome::Acquired { token } => token,
            AcquireOutcome::Held { holder } => {
                return Err(TaskMeshError::LeadershipNotAcquired {
                    holder: holder.unwrap_or_else(|| "unknown".to_string()),
                });
            }
        };
        info!(key, ttl_ms = ttl.as_millis() as u64, "获得租约");

        let (lost_tx, lost_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);
        let keeper = tokio::spawn(Self::keep_alive(
            lock.clone(),
            key.to_string(),
            token.clone(),
            ttl,
            lost_tx,
            stop_rx,
        ));

        Ok(Self {
            lock,
            key: key.to_string(),
            token,
            lost_rx,
            stop_tx,
            keeper: Some(keeper),
        })
    }

    async fn keep_alive(
        lock: Arc<dyn DistributedLock>,
        key: String,
        token: String,
        ttl: Duration,
        lost_tx: watch::Sender<bool>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let period = (ttl / 3).max(Duration::from_millis(10));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval的第一次tick立即完成
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    debug!(key = %key, "停止续约");
                    return;
                }
                _ = interval.tick() => {}
            }

            match lock.renew(&key, &token, ttl).await {
                Ok(true) => debug!(key = %key, "续约成功"),
                Ok(false) => {
                    warn!(key = %key, "租约已丢失");
                    let _ = lost_tx.send(true);
                    return;
                }
                Err(e) => {
                    error!(key = %key, error = %e, "续约失败");
                    let _ = lost_tx.send(true);
                    return;
                }
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_lost(&self) -> bool {
        *self.lost_rx.borrow()
    }

    /// 租约丢失信号，值变为 `true` 后不会再变回
    pub fn lost_signal(&self) -> watch::Receiver<bool> {
        self.lost_rx.clone()
    }

    async fn stop_keeper(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(keeper) = self.keeper.take() {
            let _ = keeper.await;
        }
    }

    /// 停止续约并删除键，只删除仍属于自己的租约
    pub async fn release(mut self) -> Result<bool> {
        self.stop_keeper().await;
        let released = self.lock.release(&self.key, &self.token).await?;
        info!(key = %self.key, released, "释放租约");
        Ok(released)
    }

    /// 只停止续约，不删除键
    pub async fn abandon(mut self) {
        self.stop_keeper().await;
    }
}

impl Drop for LeaseHandle {
    fn drop(&mut self) {
        if let Some(keeper) = self.keeper.take() {
            keeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_testing_utils::{InMemoryLock, TestEnv};

    const KEY: &str = "taskmesh/scheduler/leader";

    #[tokio::test]
    async fn test_second_acquire_is_rejected() {
        let lock = InMemoryLock::new();
        let handle = LeaseHandle::acquire(Arc::new(lock.clone()), KEY, "a", Duration::from_secs(5))
            .await
            .unwrap();

        let err = LeaseHandle::acquire(Arc::new(lock.clone()), KEY, "b", Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TaskMeshError::LeadershipNotAcquired { ref holder } if holder == "a"
        ));

        assert!(handle.release().await.unwrap());
        assert!(lock.holder(KEY).is_none());
    }

    #[tokio::test]
    async fn test_renewal_keeps_lease_past_ttl() {
        let lock = InMemoryLock::new();
        let handle = LeaseHandle::acquire(
            Arc::new(lock.clone()),
            KEY,
            "a",
            Duration::from_millis(150),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_lost());
        assert_eq!(lock.holder(KEY).as_deref(), Some("a"));
        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_lease_flips_signal() {
        let lock = InMemoryLock::new();
        let handle = LeaseHandle::acquire(
            Arc::new(lock.clone()),
            KEY,
            "a",
            Duration::from_millis(150),
        )
        .await
        .unwrap();
        let signal = handle.lost_signal();

        lock.expire(KEY);
        assert!(TestEnv::wait_for(
            || {
                let signal = signal.clone();
                async move { *signal.borrow() }
            },
            Duration::from_secs(2)
        )
        .await);
        assert!(handle.is_lost());

        // 已经不属于自己的键不会被删除
        lock.try_acquire(KEY, "b", Duration::from_secs(5)).await.unwrap();
        assert!(!handle.release().await.unwrap());
        assert_eq!(lock.holder(KEY).as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_renew_error_counts_as_lost() {
        let lock = InMemoryLock::new();
        let handle = LeaseHandle::acquire(
            Arc::new(lock.clone()),
            KEY,
            "a",
            Duration::from_millis(150),
        )
        .await
        .unwrap();
        lock.set_renew_failure(true);

        let signal = handle.lost_signal();
        assert!(TestEnv::wait_for(
            || {
                let signal = signal.clone();
                async move { *signal.borrow() }
            },
            Duration::from_secs(2)
        )
        .await);
        handle.abandon().await;
    }
}
