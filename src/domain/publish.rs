//! 发布相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 发布目标（来自项目配置 `publishTargets`）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PublishTarget {
    /// 目标名称，项目内唯一
    pub name: String,
    /// 目标类型，对应插件注册的 target type
    #[serde(rename = "type")]
    pub target_type: String,
    /// 插件私有配置
    #[serde(default)]
    pub configuration: serde_json::Value,
}

impl PublishTarget {
    pub fn new(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            configuration: serde_json::Value::Object(Default::default()),
        }
    }
}

/// 发布状态
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// 尚未发布过
    Unpublished,
    Running,
    Succeeded,
    Failed,
}

impl PublishStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Unpublished => "unpublished",
            PublishStatus::Running => "running",
            PublishStatus::Succeeded => "succeeded",
            PublishStatus::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishStatus::Succeeded | PublishStatus::Failed)
    }
}

/// 单次发布的状态记录，由插件维护，控制器只负责转发
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishStatusRecord {
    pub project_id: String,
    pub target: String,
    pub status: PublishStatus,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// 发布版本号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// 发布备注
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 日志流地址（仅脚本插件）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl PublishStatusRecord {
    pub fn new(
        project_id: impl Into<String>,
        target: impl Into<String>,
        status: PublishStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            target: target.into(),
            status,
            timestamp: Utc::now(),
            message: message.into(),
            version: None,
            comment: None,
            log: None,
        }
    }

    /// 未发布状态
    pub fn unpublished(project_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(project_id, target, PublishStatus::Unpublished, "Not published yet")
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }
}

/// 发布历史，最新的记录在前
pub type PublishHistoryEntry = Vec<PublishStatusRecord>;

/// 插件支持的能力
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginFeatures {
    pub publish: bool,
    pub status: bool,
    pub history: bool,
    pub rollback: bool,
}

impl PluginFeatures {
    pub fn all() -> Self {
        Self {
            publish: true,
            status: true,
            history: true,
            rollback: true,
        }
    }
}

/// 已注册的发布目标类型（getTypes 返回项）
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PublishTargetType {
    pub name: String,
    pub description: String,
    pub features: PluginFeatures,
}

/// 每个 (project, target) 的发布状态机
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    #[default]
    NeverPublished,
    Publishing,
    Published,
    PublishFailed,
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishState::NeverPublished => "never_published",
            PublishState::Publishing => "publishing",
            PublishState::Published => "published",
            PublishState::PublishFailed => "publish_failed",
        }
    }

    /// 根据插件返回的状态记录推导下一个状态
    ///
    /// `Unpublished` 不改变状态
    pub fn observe(self, status: PublishStatus) -> Self {
        match status {
            PublishStatus::Unpublished => self,
            PublishStatus::Running => PublishState::Publishing,
            PublishStatus::Succeeded => PublishState::Published,
            PublishStatus::Failed => PublishState::PublishFailed,
        }
    }
}

/// 发布请求体
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PublishBody {
    /// 发布备注
    #[serde(default)]
    pub comment: Option<String>,
    /// 透传给插件的附加数据
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// 回滚请求体
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RollbackBody {
    /// 回滚到的版本，缺省时回滚到上一个成功版本
    #[serde(default)]
    pub version: Option<String>,
}
