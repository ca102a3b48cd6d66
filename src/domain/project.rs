//! Bot 项目领域模型

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::publish::PublishTarget;

/// 项目存储位置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLocation {
    /// 存储 ID（目前只有 "default" 本地文件系统）
    #[serde(default = "default_storage_id")]
    pub storage_id: String,
    /// 项目目录
    pub path: PathBuf,
}

fn default_storage_id() -> String {
    "default".to_string()
}

impl ProjectLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_id: default_storage_id(),
            path: path.into(),
        }
    }
}

/// 项目配置（settings/appsettings.json）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub publish_targets: Vec<PublishTarget>,
}

/// 已打开的 Bot 项目
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotProject {
    pub id: String,
    pub name: String,
    pub location: ProjectLocation,
    /// 相对项目根目录的文件列表
    pub files: Vec<String>,
    pub settings: ProjectSettings,
}

impl BotProject {
    /// 项目根目录
    pub fn dir(&self) -> &std::path::Path {
        &self.location.path
    }
}
