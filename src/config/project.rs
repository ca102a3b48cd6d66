//! 项目发布配置
//!
//! 项目的发布目标来自 `settings/appsettings.json` 的 `publishTargets`，
//! 另外每个项目都隐含一个 `default` 目标（类型 `localpublish`）

use std::path::Path;
use tokio::fs;
use tracing::warn;

use crate::config::env::constants::{DEFAULT_TARGET_NAME, DEFAULT_TARGET_TYPE};
use crate::domain::project::ProjectSettings;
use crate::domain::publish::PublishTarget;

/// 项目配置文件相对路径
pub const SETTINGS_FILE: &str = "settings/appsettings.json";

/// 内置默认目标
pub fn default_target() -> PublishTarget {
    PublishTarget::new(DEFAULT_TARGET_NAME, DEFAULT_TARGET_TYPE)
}

/// 项目可用的全部发布目标（默认目标在前）
pub fn all_targets(settings: &ProjectSettings) -> Vec<PublishTarget> {
    let mut targets = vec![default_target()];
    targets.extend(settings.publish_targets.iter().cloned());
    targets
}

/// 按名称解析发布目标，先匹配者优先
pub fn resolve_target(settings: &ProjectSettings, name: &str) -> Option<PublishTarget> {
    all_targets(settings).into_iter().find(|t| t.name == name)
}

/// 读取项目配置
///
/// 文件不存在时返回空配置；解析失败记录警告并返回空配置
pub async fn load_settings(project_dir: &Path) -> ProjectSettings {
    let path = project_dir.join(SETTINGS_FILE);
    if !path.exists() {
        return ProjectSettings::default();
    }

    match fs::read_to_string(&path).await {
        Ok(content) => match serde_json::from_str::<ProjectSettings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse project settings, ignoring");
                ProjectSettings::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read project settings");
            ProjectSettings::default()
        }
    }
}
