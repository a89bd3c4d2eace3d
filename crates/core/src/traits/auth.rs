use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// 终端用户身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// 面向终端用户的操作权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CallTask,
    KillTask,
    ReadResult,
    ListTasks,
    ListSchedules,
    ListWorkers,
}

/// 外部认证服务，只负责终端用户身份与权限；Worker回调不经过这里
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn authenticate(&self, bearer: &str) -> Result<Identity>;

    async fn authorize(&self, identity: &Identity, permission: Permission) -> Result<()>;
}
