//! Bot Publisher - 可插拔的 bot 项目发布服务
//!
//! 库入口：模块声明、路由组装和服务启动

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod plugins;
pub mod services;
pub mod state;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub use config::{EnvConfig, RuntimeConfig};
use state::app_state::{get_shutdown_token, trigger_shutdown};
use state::error_channel::install_panic_hook;
use state::AppState;

/// 日志通道保留时长（小时）
const LOG_RETENTION_HOURS: i64 = 24;

/// 日志通道清理间隔
const LOG_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// 构建应用路由
pub fn app(state: Arc<AppState>) -> Router {
    api::router(state)
}

/// 初始化并运行发布服务
pub async fn init_and_run_with_config(runtime: RuntimeConfig) -> anyhow::Result<()> {
    let config = EnvConfig::from_env().apply(&runtime);
    let port = config.port;

    let state = Arc::new(AppState::new(config)?);
    if state.plugins.is_empty() {
        tracing::warn!("No publish plugins loaded, every target will be rejected");
    }

    let panic_guard = install_panic_hook(state.errors.clone());

    // 后台清理过期日志通道
    let log_hub = state.log_hub.clone();
    let shutdown = get_shutdown_token();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOG_CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => log_hub.cleanup_expired(LOG_RETENTION_HOURS).await,
                _ = shutdown.cancelled() => break,
            }
        }
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, version = config::env::constants::VERSION, "Bot publisher listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(panic_guard);
    tracing::info!("Bot publisher stopped");
    Ok(())
}

/// 等待 Ctrl+C 并触发全局 shutdown
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    trigger_shutdown();
}
