use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use taskmesh_core::{traits::TokenStore, Result};
use tracing::{debug, warn};

/// 令牌绑定的调用范围：派发到哪个Worker的哪一次调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvTokenBinding {
    pub address: String,
    pub task_unique_id: String,
}

impl SrvTokenBinding {
    pub fn new(address: impl Into<String>, task_unique_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            task_unique_id: task_unique_id.into(),
        }
    }
}

/// Worker回调凭证的签发与核销
///
/// 令牌只能使用一次：无论校验成功与否，`verify_and_unregister` / `redeem`
/// 都会立即从存储中删除该令牌。
pub struct SrvTokenAuthority {
    store: Arc<dyn TokenStore>,
    ttl: Duration,
}

impl SrvTokenAuthority {
    pub fn new(store: Arc<dyn TokenStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn generate_token(binding_key: &str) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let random: [u8; 32] = rand::random();

        let mut hasher = Sha256::new();
        hasher.update(binding_key.as_bytes());
        hasher.update(nanos.to_be_bytes());
        hasher.update(random);
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    pub async fn new_with_binding(&self, binding_key: &str) -> Result<String> {
        let token = Self::generate_token(binding_key);
        self.store.put(&token, binding_key, self.ttl).await?;
        Ok(token)
    }

    pub async fn verify_and_unregister(&self, token: &str) -> Result<bool> {
        Ok(self.redeem(token).await?.is_some())
    }

    /// 核销令牌并返回其绑定内容
    pub async fn redeem(&self, token: &str) -> Result<Option<String>> {
        if token.is_empty() {
            return Ok(None);
        }
        let binding = self.store.take(token).await?;
        if binding.is_none() {
            debug!("回调令牌不存在或已过期");
        }
        Ok(binding)
    }

    pub async fn mint_for(&self, binding: &SrvTokenBinding) -> Result<String> {
        let key = serde_json::to_string(binding)?;
        self.new_with_binding(&key).await
    }

    /// 核销令牌并解析调用范围，绑定内容无法解析时视为无效
    pub async fn redeem_binding(&self, token: &str) -> Result<Option<SrvTokenBinding>> {
        let Some(raw) = self.redeem(token).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(binding) => Ok(Some(binding)),
            Err(e) => {
                warn!(error = %e, "回调令牌绑定内容格式错误");
                Ok(None)
            }
        }
    }
}
