//! 本地发布插件
//!
//! 把项目文件复制到 `<data_dir>/<plugin>/<project>/<target>/<version>/`，
//! 并用 `current` 文件记录当前生效的版本

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::domain::publish::{
    PluginFeatures, PublishBody, PublishHistoryEntry, PublishStatus, PublishStatusRecord,
};
use crate::infra::fs::copy_tree;

use super::{HistoryStore, PluginError, PublishContext, PublishPlugin};

/// 当前版本标记文件
const CURRENT_FILE: &str = "current";

/// 本地发布插件
pub struct LocalPublisher {
    name: String,
    description: String,
    root: PathBuf,
    history: HistoryStore,
}

impl LocalPublisher {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        data_dir: PathBuf,
        history_limit: usize,
    ) -> Self {
        let name = name.into();
        Self {
            root: data_dir.join(&name),
            name,
            description: description.into(),
            history: HistoryStore::new(history_limit),
        }
    }

    fn target_dir(&self, ctx: &PublishContext) -> PathBuf {
        self.root.join(ctx.project_id()).join(ctx.target_name())
    }

    /// 当前生效的版本
    pub async fn current_version(&self, ctx: &PublishContext) -> Option<String> {
        tokio::fs::read_to_string(self.target_dir(ctx).join(CURRENT_FILE))
            .await
            .ok()
            .map(|v| v.trim().to_string())
    }

    async fn activate(&self, ctx: &PublishContext, version: &str) -> Result<(), PluginError> {
        let dir = self.target_dir(ctx);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(CURRENT_FILE), version).await?;
        Ok(())
    }
}

#[async_trait]
impl PublishPlugin for LocalPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn features(&self) -> PluginFeatures {
        PluginFeatures::all()
    }

    async fn publish(
        &self,
        ctx: &PublishContext,
        version: &str,
        body: &PublishBody,
    ) -> Result<PublishStatusRecord, PluginError> {
        let src = ctx.project.dir().to_path_buf();
        let dest = self.target_dir(ctx).join(version);

        let copy_dest = dest.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&src, &copy_dest))
            .await
            .map_err(|e| PluginError::Failed(e.to_string()))?;

        let record = match copied {
            Ok(files) => {
                self.activate(ctx, version).await?;
                info!(
                    plugin = %self.name,
                    project_id = %ctx.project_id(),
                    target = %ctx.target_name(),
                    version = %version,
                    files,
                    "Published project locally"
                );
                PublishStatusRecord::new(
                    ctx.project_id(),
                    ctx.target_name(),
                    PublishStatus::Succeeded,
                    format!("Published {} files", files),
                )
            }
            Err(e) => {
                warn!(
                    plugin = %self.name,
                    project_id = %ctx.project_id(),
                    version = %version,
                    error = %e,
                    "Local publish failed"
                );
                PublishStatusRecord::new(
                    ctx.project_id(),
                    ctx.target_name(),
                    PublishStatus::Failed,
                    format!("{:#}", e),
                )
            }
        }
        .with_version(version)
        .with_comment(body.comment.clone());

        self.history.record(record.clone()).await;
        Ok(record)
    }

    async fn status(&self, ctx: &PublishContext) -> Result<PublishStatusRecord, PluginError> {
        Ok(self
            .history
            .latest(ctx.project_id(), ctx.target_name())
            .await
            .unwrap_or_else(|| PublishStatusRecord::unpublished(ctx.project_id(), ctx.target_name())))
    }

    async fn history(&self, ctx: &PublishContext) -> Result<PublishHistoryEntry, PluginError> {
        Ok(self.history.list(ctx.project_id(), ctx.target_name()).await)
    }

    async fn rollback(
        &self,
        ctx: &PublishContext,
        version: Option<&str>,
    ) -> Result<PublishStatusRecord, PluginError> {
        // 以 current 指针为准，失败的发布不会改变生效版本
        let current = self.current_version(ctx).await;
        let version = self
            .history
            .rollback_version(ctx.project_id(), ctx.target_name(), version, current.as_deref())
            .await?;

        if !self.target_dir(ctx).join(&version).is_dir() {
            return Err(PluginError::Failed(format!(
                "artifacts for version '{}' are missing",
                version
            )));
        }
        self.activate(ctx, &version).await?;

        info!(
            plugin = %self.name,
            project_id = %ctx.project_id(),
            target = %ctx.target_name(),
            version = %version,
            "Rolled back local publish"
        );

        let record = PublishStatusRecord::new(
            ctx.project_id(),
            ctx.target_name(),
            PublishStatus::Succeeded,
            format!("Rolled back to {}", version),
        )
        .with_version(version);
        self.history.record(record.clone()).await;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{BotProject, ProjectLocation, ProjectSettings};
    use crate::domain::publish::PublishTarget;

    fn context(project_dir: &std::path::Path) -> PublishContext {
        PublishContext {
            project: BotProject {
                id: "p1".into(),
                name: "bot1".into(),
                location: ProjectLocation::new(project_dir),
                files: vec!["bot1.dialog".into()],
                settings: ProjectSettings::default(),
            },
            target: PublishTarget::new("default", "localpublish"),
        }
    }

    #[tokio::test]
    async fn test_publish_status_history_rollback() {
        let bot = tempfile::tempdir().unwrap();
        std::fs::write(bot.path().join("bot1.dialog"), "{}").unwrap();
        let data = tempfile::tempdir().unwrap();
        let plugin = LocalPublisher::new("localPublish", "", data.path().to_path_buf(), 10);
        let ctx = context(bot.path());

        let status = plugin.status(&ctx).await.unwrap();
        assert_eq!(status.status, PublishStatus::Unpublished);

        let body = PublishBody {
            comment: Some("first".into()),
            ..Default::default()
        };
        let first = plugin.publish(&ctx, "v1", &body).await.unwrap();
        assert_eq!(first.status, PublishStatus::Succeeded);
        assert_eq!(first.comment.as_deref(), Some("first"));
        assert!(data.path().join("localPublish/p1/default/v1/bot1.dialog").is_file());

        plugin.publish(&ctx, "v2", &PublishBody::default()).await.unwrap();
        assert_eq!(plugin.current_version(&ctx).await.as_deref(), Some("v2"));

        let rolled = plugin.rollback(&ctx, None).await.unwrap();
        assert_eq!(rolled.version.as_deref(), Some("v1"));
        assert_eq!(plugin.current_version(&ctx).await.as_deref(), Some("v1"));

        let history = plugin.history(&ctx).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "Rolled back to v1");

        // 再次回滚跳过正在生效的 v1
        let again = plugin.rollback(&ctx, None).await.unwrap();
        assert_eq!(again.version.as_deref(), Some("v2"));
        assert_eq!(plugin.current_version(&ctx).await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_rollback_with_single_success() {
        let bot = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let plugin = LocalPublisher::new("localPublish", "", data.path().to_path_buf(), 10);
        let ctx = context(bot.path());

        plugin.publish(&ctx, "v1", &PublishBody::default()).await.unwrap();
        let err = plugin.rollback(&ctx, None).await.unwrap_err();
        assert!(matches!(err, PluginError::NothingToRollBack));
        assert_eq!(plugin.current_version(&ctx).await.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_rollback_unknown_version() {
        let bot = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let plugin = LocalPublisher::new("localPublish", "", data.path().to_path_buf(), 10);
        let ctx = context(bot.path());

        plugin.publish(&ctx, "v1", &PublishBody::default()).await.unwrap();
        let err = plugin.rollback(&ctx, Some("v9")).await.unwrap_err();
        assert!(matches!(err, PluginError::VersionNotFound(_)));
    }
}
