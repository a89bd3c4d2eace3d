use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use taskmesh_core::{
    config::models::AuthConfig,
    traits::{AuthService, Identity, Permission},
    Result, TaskMeshError,
};
use tracing::warn;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_OPERATOR: &str = "operator";
pub const ROLE_VIEWER: &str = "viewer";

/// 基于配置文件中静态API Key的认证服务
///
/// 只保存Key的SHA-256摘要。角色到权限的映射：
/// `admin` 拥有全部权限，`operator` 可调用和终止任务，`viewer` 只读。
pub struct StaticAuthService {
    keys: HashMap<String, Identity>,
}

impl StaticAuthService {
    pub fn from_config(config: &AuthConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .map(|api_key| {
                (
                    Self::hash_api_key(&api_key.key),
                    Identity {
                        user: api_key.user.clone(),
                        roles: api_key.roles.clone(),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    fn hash_api_key(api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        general_purpose::STANDARD.encode(hasher.finalize())
    }

    fn role_allows(role: &str, permission: Permission) -> bool {
        match role {
            ROLE_ADMIN | ROLE_OPERATOR => true,
            ROLE_VIEWER => !matches!(permission, Permission::CallTask | Permission::KillTask),
            _ => false,
        }
    }
}

#[async_trait]
impl AuthService for StaticAuthService {
    async fn authenticate(&self, bearer: &str) -> Result<Identity> {
        let key = bearer.strip_prefix("Bearer ").unwrap_or(bearer).trim();
        if key.is_empty() {
            return Err(TaskMeshError::Auth("缺少认证令牌".to_string()));
        }
        self.keys
            .get(&Self::hash_api_key(key))
            .cloned()
            .ok_or_else(|| TaskMeshError::Auth("无效的API Key".to_string()))
    }

    async fn authorize(&self, identity: &Identity, permission: Permission) -> Result<()> {
        if identity
            .roles
            .iter()
            .any(|role| Self::role_allows(role, permission))
        {
            return Ok(());
        }
        warn!(user = %identity.user, ?permission, "权限不足");
        Err(TaskMeshError::Forbidden(format!(
            "用户 {} 没有 {permission:?} 权限",
            identity.user
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::config::models::ApiKeyConfig;

    fn service() -> StaticAuthService {
        StaticAuthService::from_config(&AuthConfig {
            api_keys: vec![
                ApiKeyConfig {
                    key: "operator-key-0123456789".to_string(),
                    user: "alice".to_string(),
                    roles: vec![ROLE_OPERATOR.to_string()],
                },
                ApiKeyConfig {
                    key: "viewer-key-0123456789".to_string(),
                    user: "bob".to_string(),
                    roles: vec![ROLE_VIEWER.to_string()],
                },
            ],
        })
    }

    #[tokio::test]
    async fn test_authenticate() {
        let auth = service();
        let alice = auth
            .authenticate("Bearer operator-key-0123456789")
            .await
            .unwrap();
        assert_eq!(alice.user, "alice");

        let bob = auth.authenticate("viewer-key-0123456789").await.unwrap();
        assert_eq!(bob.user, "bob");

        assert!(matches!(
            auth.authenticate("Bearer nope").await,
            Err(TaskMeshError::Auth(_))
        ));
        assert!(matches!(
            auth.authenticate("").await,
            Err(TaskMeshError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_by_role() {
        let auth = service();
        let bob = auth.authenticate("viewer-key-0123456789").await.unwrap();
        assert!(auth.authorize(&bob, Permission::ReadResult).await.is_ok());
        assert!(matches!(
            auth.authorize(&bob, Permission::CallTask).await,
            Err(TaskMeshError::Forbidden(_))
        ));

        let alice = auth
            .authenticate("operator-key-0123456789")
            .await
            .unwrap();
        assert!(auth.authorize(&alice, Permission::KillTask).await.is_ok());

        let nobody = Identity {
            user: "eve".to_string(),
            roles: vec![],
        };
        assert!(auth.authorize(&nobody, Permission::ListWorkers).await.is_err());
    }
}
