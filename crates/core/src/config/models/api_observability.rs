use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled {
            self.bind_address
                .parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow::anyhow!("监听地址无效 {}: {e}", self.bind_address))?;
        }
        Ok(())
    }
}

/// 静态API Key认证配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub user: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for api_key in &self.api_keys {
            if api_key.key.len() < 16 {
                return Err(anyhow::anyhow!(
                    "用户 {} 的API Key长度不能少于16个字符",
                    api_key.user
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let levels = ["trace", "debug", "info", "warn", "error"];
        if !levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }
        self.log_format.parse::<LogFormat>()?;
        Ok(())
    }
}
