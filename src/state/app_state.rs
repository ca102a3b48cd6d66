//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::env::EnvConfig;
use crate::infra::project_store::{FsProjectStore, ProjectStore};
use crate::plugins::{PluginHost, PluginRegistry};

use super::error_channel::ErrorChannel;
use super::log_hub::LogHub;
use super::publish_ledger::PublishLedger;

/// 全局 shutdown token，用于优雅关闭所有后台任务
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN
        .get_or_init(CancellationToken::new)
        .clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

/// 应用状态
pub struct AppState {
    // ========== 核心配置 ==========
    /// API 密钥（用于验证请求）
    pub api_key: String,
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,

    // ========== 协作者 ==========
    /// 项目存储
    pub projects: Arc<dyn ProjectStore>,
    /// 插件注册表（启动后只读）
    pub plugins: PluginRegistry,

    // ========== 运行时状态 ==========
    /// 发布台账
    pub ledger: PublishLedger,
    /// 发布日志
    pub log_hub: Arc<LogHub>,
    /// 应用错误通道
    pub errors: Arc<ErrorChannel>,
}

impl AppState {
    /// 按配置创建应用状态，扫描插件目录
    pub fn new(config: EnvConfig) -> anyhow::Result<Self> {
        let host = Self::plugin_host(&config);
        let plugins = PluginRegistry::load_from_dir(&config.plugins_dir, &host)?;

        tracing::info!(
            api_key_len = config.api_key.len(),
            port = config.port,
            plugins_dir = %config.plugins_dir.display(),
            data_dir = %config.data_dir.display(),
            target_types = plugins.len(),
            "Loaded configuration"
        );

        Ok(Self::with_parts(
            config,
            Arc::new(FsProjectStore::new()),
            plugins,
            &host,
        ))
    }

    /// 用给定的协作者组装状态，日志与错误通道与插件共享
    pub fn with_parts(
        config: EnvConfig,
        projects: Arc<dyn ProjectStore>,
        plugins: PluginRegistry,
        host: &PluginHost,
    ) -> Self {
        Self {
            api_key: config.api_key.clone(),
            started_at: Utc::now(),
            projects,
            plugins,
            ledger: PublishLedger::new(),
            log_hub: host.log_hub.clone(),
            errors: host.errors.clone(),
            config,
        }
    }

    /// 插件宿主资源
    pub fn plugin_host(config: &EnvConfig) -> PluginHost {
        PluginHost {
            data_dir: config.data_dir.clone(),
            history_limit: config.history_limit,
            log_hub: Arc::new(LogHub::new()),
            errors: Arc::new(ErrorChannel::new()),
            shutdown: get_shutdown_token(),
        }
    }
}
