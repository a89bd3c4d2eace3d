use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, AuthConfig, ObservabilityConfig},
    coordination::{DiscoveryConfig, RedisConfig},
    database::DatabaseConfig,
    dispatcher_scheduler::{DispatcherConfig, SchedulerConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub discovery: DiscoveryConfig,
    pub dispatcher: DispatcherConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: TASKMESH__)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/taskmesh.toml",
                "taskmesh.toml",
                "/etc/taskmesh/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TASKMESH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.redis.validate().context("Redis配置验证失败")?;
        self.discovery.validate().context("服务发现配置验证失败")?;
        self.dispatcher.validate().context("分发器配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.auth.validate().context("认证配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }

    /// Worker发现记录的完整键前缀
    pub fn worker_key_prefix(&self) -> String {
        format!("{}{}", self.redis.key_prefix, self.discovery.worker_prefix)
    }

    /// 调度器领导者租约的完整键
    pub fn leader_key(&self) -> String {
        format!("{}{}", self.redis.key_prefix, self.scheduler.leader_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartitionGranularity;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_key_prefix(), "taskmesh/workers/");
        assert_eq!(config.leader_key(), "taskmesh/scheduler/leader");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            url = "postgresql://localhost/taskmesh"

            [dispatcher]
            partition_granularity = "month"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "postgresql://localhost/taskmesh");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(
            config.dispatcher.partition_granularity,
            PartitionGranularity::Month
        );
        assert_eq!(config.scheduler.lease_ttl_seconds, 15);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_toml("[database]\nurl = \"mysql://x\"").is_err());
        assert!(AppConfig::from_toml("[scheduler]\nlease_ttl_seconds = 1").is_err());
        assert!(AppConfig::from_toml("[observability]\nlog_format = \"xml\"").is_err());
        assert!(AppConfig::from_toml(
            "[[auth.api_keys]]\nkey = \"short\"\nuser = \"alice\""
        )
        .is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let back = AppConfig::from_toml(&text).unwrap();
        assert_eq!(back.redis.url, config.redis.url);
        assert_eq!(back.api.bind_address, config.api.bind_address);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[api]\nbind_address = \"127.0.0.1:9090\"\n[scheduler]\nenabled = false"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.api.bind_address, "127.0.0.1:9090");
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }
}
