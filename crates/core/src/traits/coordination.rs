use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// 服务发现中的一条原始记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Worker服务发现后端，每次调用都读取实时状态
#[async_trait]
pub trait WorkerDiscovery: Send + Sync {
    /// 列出固定前缀下的所有记录，不做解码
    async fn list_entries(&self) -> Result<Vec<DiscoveryEntry>>;
}

/// 加锁尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// 成功创建键，`token` 用于续约和释放
    Acquired { token: String },
    /// 键已被他人持有
    Held { holder: Option<String> },
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }
}

/// 分布式锁能力: 原子的"不存在才创建" + 可续约的TTL
///
/// 任何提供这两种原语的后端（Redis、etcd、带唯一约束的关系表）都可以实现。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<AcquireOutcome>;

    /// 续约，返回 `false` 表示租约已丢失（过期或被他人持有）
    async fn renew(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// 释放租约并删除键，只有持有者才能释放
    async fn release(&self, key: &str, token: &str) -> Result<bool>;

    async fn current_holder(&self, key: &str) -> Result<Option<String>>;
}

/// 带TTL的一次性令牌存储
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn put(&self, token: &str, binding: &str, ttl: Duration) -> Result<()>;

    /// 取出并删除，无论是否存在都保证调用后该令牌不可再用
    async fn take(&self, token: &str) -> Result<Option<String>>;
}
