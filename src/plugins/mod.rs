//! 发布插件
//!
//! 插件在启动时从插件目录加载，每个插件注册一个或多个 target type，
//! 实现 `PublishPlugin` 的 publish / status / history / rollback

pub mod history;
pub mod local;
pub mod manifest;
pub mod registry;
pub mod script;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::project::BotProject;
use crate::domain::publish::{
    PluginFeatures, PublishBody, PublishHistoryEntry, PublishStatusRecord, PublishTarget,
};
use crate::infra::command::CommandError;
use crate::state::{ErrorChannel, LogHub};

pub use history::HistoryStore;
pub use manifest::{PluginManifest, RuntimeKind};
pub use registry::PluginRegistry;

/// 插件错误
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),
    #[error("version '{0}' was never successfully published")]
    VersionNotFound(String),
    #[error("no earlier successful publish to roll back to")]
    NothingToRollBack,
    #[error("operation '{0}' is not implemented by this plugin")]
    Unsupported(&'static str),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 单次插件调用的上下文
#[derive(Clone, Debug)]
pub struct PublishContext {
    pub project: BotProject,
    pub target: PublishTarget,
}

impl PublishContext {
    pub fn project_id(&self) -> &str {
        &self.project.id
    }

    pub fn target_name(&self) -> &str {
        &self.target.name
    }
}

/// 插件运行所需的宿主资源
#[derive(Clone)]
pub struct PluginHost {
    /// 发布产物根目录
    pub data_dir: PathBuf,
    /// 每个 (project, target) 保留的历史数
    pub history_limit: usize,
    /// 发布日志广播
    pub log_hub: Arc<LogHub>,
    /// 后台发布无法执行时上报
    pub errors: Arc<ErrorChannel>,
    /// 关闭时取消后台发布
    pub shutdown: CancellationToken,
}

/// 发布插件接口
#[async_trait]
pub trait PublishPlugin: Send + Sync {
    /// 插件名称
    fn name(&self) -> &str;

    /// 插件描述
    fn description(&self) -> &str;

    /// 插件支持的能力
    fn features(&self) -> PluginFeatures;

    /// 发布项目的一个新版本
    async fn publish(
        &self,
        ctx: &PublishContext,
        version: &str,
        body: &PublishBody,
    ) -> Result<PublishStatusRecord, PluginError>;

    /// 最近一次发布的状态，从未发布时返回 `Unpublished`
    async fn status(&self, ctx: &PublishContext) -> Result<PublishStatusRecord, PluginError>;

    /// 发布历史，最新的在前
    async fn history(&self, _ctx: &PublishContext) -> Result<PublishHistoryEntry, PluginError> {
        Err(PluginError::Unsupported("history"))
    }

    /// 回滚到指定版本，缺省为上一个成功版本
    async fn rollback(
        &self,
        _ctx: &PublishContext,
        _version: Option<&str>,
    ) -> Result<PublishStatusRecord, PluginError> {
        Err(PluginError::Unsupported("rollback"))
    }
}
