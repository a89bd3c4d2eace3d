use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use taskmesh_core::{init_logging, AppConfig};
use tokio::{signal, task::JoinHandle};
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::ShutdownManager;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("taskmesh")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式任务执行平台")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时按默认位置查找"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["scheduler", "api", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");

    let config = AppConfig::load(config_path).context("加载配置失败")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!(
        config = config_path.unwrap_or("<默认位置>"),
        mode = mode_str,
        "启动TaskMesh"
    );

    let mode = parse_app_mode(mode_str, &config)?;
    let app = Arc::new(Application::new(config, mode).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle: JoinHandle<Result<()>> = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        finished = &mut app_handle => {
            // 组件自行退出，例如调度器失去领导权
            shutdown_manager.shutdown();
            return flatten(finished);
        }
    }

    shutdown_manager.shutdown();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
        Ok(finished) => flatten(finished)?,
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("TaskMesh已退出");
    Ok(())
}

fn flatten(finished: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match finished {
        Ok(Ok(())) => {
            info!("应用已优雅关闭");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %format!("{e:#}"), "应用运行失败");
            Err(e)
        }
        Err(e) => Err(e).context("应用任务异常退出"),
    }
}

/// 解析应用运行模式
fn parse_app_mode(mode_str: &str, config: &AppConfig) -> Result<AppMode> {
    match mode_str {
        "scheduler" => {
            if !config.scheduler.enabled {
                return Err(anyhow::anyhow!("调度器模式被禁用，请检查配置"));
            }
            Ok(AppMode::Scheduler)
        }
        "api" => {
            if !config.api.enabled {
                return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
            }
            Ok(AppMode::Api)
        }
        "all" => Ok(AppMode::All),
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode_str}")),
    }
}

/// 等待 Ctrl+C 或 SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "安装Ctrl+C信号处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "安装SIGTERM信号处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_mode() {
        let mut config = AppConfig::default();
        assert_eq!(parse_app_mode("all", &config).unwrap(), AppMode::All);
        assert_eq!(parse_app_mode("api", &config).unwrap(), AppMode::Api);

        config.scheduler.enabled = false;
        assert!(parse_app_mode("scheduler", &config).is_err());
        assert_eq!(parse_app_mode("all", &config).unwrap(), AppMode::All);
        assert!(parse_app_mode("worker", &config).is_err());
    }
}
