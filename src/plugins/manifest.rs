//! 插件清单（`<plugins_dir>/<plugin>/plugin.json`）

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;

use crate::domain::publish::PluginFeatures;

/// 插件运行方式
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// 复制项目文件到本地发布目录
    #[default]
    Local,
    /// 执行外部脚本
    Script,
}

/// 插件清单
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 没有 publish 段的插件不参与发布
    pub publish: Option<PublishSection>,
}

/// 清单中的发布配置
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishSection {
    pub target_types: Vec<String>,
    #[serde(default)]
    pub runtime: RuntimeKind,
    /// 脚本插件的发布命令
    pub command: Option<String>,
    /// 脚本插件的回滚命令，缺省时不支持回滚
    pub rollback_command: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl PublishSection {
    /// 插件能力
    pub fn features(&self) -> PluginFeatures {
        match self.runtime {
            RuntimeKind::Local => PluginFeatures::all(),
            RuntimeKind::Script => PluginFeatures {
                rollback: self.rollback_command.is_some(),
                ..PluginFeatures::all()
            },
        }
    }
}

impl PluginManifest {
    /// 读取并校验清单
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("plugin name must not be empty");
        }
        if let Some(publish) = &self.publish {
            if publish.target_types.is_empty() {
                bail!("plugin '{}' declares no target types", self.name);
            }
            if publish.target_types.iter().any(|t| t.trim().is_empty()) {
                bail!("plugin '{}' declares an empty target type", self.name);
            }
            if publish.runtime == RuntimeKind::Script && publish.command.is_none() {
                bail!("script plugin '{}' requires a command", self.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> anyhow::Result<PluginManifest> {
        let manifest: PluginManifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    #[test]
    fn test_local_manifest_defaults() {
        let manifest = parse(
            r#"{"name":"localPublish","publish":{"targetTypes":["localpublish"]}}"#,
        )
        .unwrap();
        let publish = manifest.publish.unwrap();
        assert_eq!(publish.runtime, RuntimeKind::Local);
        assert_eq!(publish.features(), PluginFeatures::all());
        assert_eq!(manifest.description, "");
    }

    #[test]
    fn test_script_manifest_features() {
        let manifest = parse(
            r#"{"name":"shell","publish":{"targetTypes":["shell"],"runtime":"script","command":"./deploy.sh"}}"#,
        )
        .unwrap();
        let features = manifest.publish.unwrap().features();
        assert!(features.publish);
        assert!(!features.rollback);
    }

    #[test]
    fn test_invalid_manifests() {
        assert!(parse(r#"{"name":"","publish":{"targetTypes":["a"]}}"#).is_err());
        assert!(parse(r#"{"name":"x","publish":{"targetTypes":[]}}"#).is_err());
        assert!(parse(r#"{"name":"x","publish":{"targetTypes":["a"],"runtime":"script"}}"#).is_err());
        assert!(parse(r#"{"name":"x","publish":{"targetTypes":["a"],"runtime":"ftp"}}"#).is_err());
    }
}
