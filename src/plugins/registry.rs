//! 插件注册表
//!
//! 启动时扫描插件目录一次，之后只读；按 target type 查找插件

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::env::constants::{DEFAULT_SCRIPT_TIMEOUT_SECS, PLUGIN_MANIFEST};
use crate::domain::publish::PublishTargetType;

use super::local::LocalPublisher;
use super::manifest::{PluginManifest, RuntimeKind};
use super::script::{ScriptConfig, ScriptPublisher};
use super::{PluginHost, PublishPlugin};

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    /// target type -> 插件
    plugins: HashMap<String, Arc<dyn PublishPlugin>>,
}

impl PluginRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 target type，已被占用时返回 false
    pub fn register(&mut self, target_type: &str, plugin: Arc<dyn PublishPlugin>) -> bool {
        if let Some(existing) = self.plugins.get(target_type) {
            warn!(
                target_type = %target_type,
                existing = %existing.name(),
                plugin = %plugin.name(),
                "Target type already registered, ignoring"
            );
            return false;
        }
        self.plugins.insert(target_type.to_string(), plugin);
        true
    }

    /// 从插件目录加载
    ///
    /// 目录不存在时返回空注册表；清单无效的插件记录警告后跳过
    pub fn load_from_dir(dir: &Path, host: &PluginHost) -> anyhow::Result<Self> {
        let mut registry = Self::new();

        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Plugin directory not found, no publish targets available");
            return Ok(registry);
        }

        let mut plugin_dirs: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        // 保证加载顺序稳定（重复 type 时先加载者生效）
        plugin_dirs.sort();

        for plugin_dir in plugin_dirs {
            let manifest_path = plugin_dir.join(PLUGIN_MANIFEST);
            if !manifest_path.is_file() {
                continue;
            }

            let manifest = match PluginManifest::load(&manifest_path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %format!("{:#}", e), "Skipping invalid plugin");
                    continue;
                }
            };

            let Some(publish) = manifest.publish.as_ref() else {
                info!(plugin = %manifest.name, "Plugin has no publish section, skipping");
                continue;
            };

            let plugin: Arc<dyn PublishPlugin> = match publish.runtime {
                RuntimeKind::Local => Arc::new(LocalPublisher::new(
                    manifest.name.clone(),
                    manifest.description.clone(),
                    host.data_dir.clone(),
                    host.history_limit,
                )),
                RuntimeKind::Script => Arc::new(ScriptPublisher::new(
                    manifest.name.clone(),
                    manifest.description.clone(),
                    ScriptConfig {
                        // validate() 保证 script 插件有 command
                        command: publish.command.clone().unwrap_or_default(),
                        rollback_command: publish.rollback_command.clone(),
                        timeout: Duration::from_secs(
                            publish.timeout_secs.unwrap_or(DEFAULT_SCRIPT_TIMEOUT_SECS),
                        ),
                    },
                    host,
                )),
            };

            for target_type in &publish.target_types {
                if registry.register(target_type, plugin.clone()) {
                    info!(
                        plugin = %manifest.name,
                        target_type = %target_type,
                        runtime = ?publish.runtime,
                        "Registered publish target type"
                    );
                }
            }
        }

        info!(
            dir = %dir.display(),
            target_types = registry.plugins.len(),
            "Loaded publish plugins"
        );
        Ok(registry)
    }

    /// 按 target type 查找插件
    pub fn get(&self, target_type: &str) -> Option<Arc<dyn PublishPlugin>> {
        self.plugins.get(target_type).cloned()
    }

    /// 已注册的 target type，按名称排序
    pub fn types(&self) -> Vec<PublishTargetType> {
        let mut types: Vec<PublishTargetType> = self
            .plugins
            .iter()
            .map(|(name, plugin)| PublishTargetType {
                name: name.clone(),
                description: plugin.description().to_string(),
                features: plugin.features(),
            })
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }
}
