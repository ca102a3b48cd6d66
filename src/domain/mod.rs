//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod log;
pub mod project;
pub mod publish;

// Re-exports for convenience
pub use log::LogLine;
pub use project::{BotProject, ProjectLocation, ProjectSettings};
pub use publish::{
    PluginFeatures, PublishBody, PublishState, PublishStatus, PublishStatusRecord,
    PublishTarget, PublishTargetType, RollbackBody,
};
