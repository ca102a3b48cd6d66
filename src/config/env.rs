//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use tracing::warn;

use constants::{DEFAULT_HISTORY_LIMIT, DEFAULT_PORT};

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// API 密钥
    pub api_key: String,
    /// 服务监听端口
    pub port: u16,
    /// 插件目录（启动时扫描一次）
    pub plugins_dir: PathBuf,
    /// 发布产物与数据目录
    pub data_dir: PathBuf,
    /// 每个 (project, target) 保留的历史记录数
    pub history_limit: usize,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        // API Key - 支持旧名称兼容
        let api_key = load_with_fallback("PUBLISHER_API_KEY", "API_KEY")
            .unwrap_or_else(|| "change-me-in-production".to_string());
        if env::var("PUBLISHER_API_KEY").is_err() && env::var("API_KEY").is_ok() {
            warn!("Deprecated environment variable API_KEY detected. Please use PUBLISHER_API_KEY");
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let plugins_dir = env::var("PLUGINS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./plugins"));

        let data_dir = env::var("PUBLISH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let history_limit = env::var("PUBLISH_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        Self {
            api_key,
            port,
            plugins_dir,
            data_dir,
            history_limit,
        }
    }

    /// 应用命令行覆盖
    pub fn apply(mut self, runtime: &RuntimeConfig) -> Self {
        if let Some(port) = runtime.port_override {
            self.port = port;
        }
        if let Some(dir) = &runtime.plugins_dir {
            self.plugins_dir = dir.clone();
        }
        if let Some(dir) = &runtime.data_dir {
            self.data_dir = dir.clone();
        }
        self
    }
}

/// 命令行运行时参数
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    pub port_override: Option<u16>,
    pub plugins_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 默认监听端口
    pub const DEFAULT_PORT: u16 = 5000;

    /// 默认历史记录保留数量
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;

    /// 脚本发布默认超时（秒）
    pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 1800; // 30 分钟

    /// 每个项目隐含的默认发布目标
    pub const DEFAULT_TARGET_NAME: &str = "default";

    /// 默认发布目标对应的插件类型
    pub const DEFAULT_TARGET_TYPE: &str = "localpublish";

    /// 插件清单文件名
    pub const PLUGIN_MANIFEST: &str = "plugin.json";

    /// 最近错误保留数量
    pub const MAX_RECENT_ERRORS: usize = 20;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
