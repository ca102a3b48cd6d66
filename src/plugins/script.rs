//! 脚本发布插件
//!
//! 在项目目录下通过 `sh -c` 执行清单中的命令，发布在后台运行，
//! 输出通过 LogHub 以 SSE 推送

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::log::LogLine;
use crate::domain::publish::{
    PluginFeatures, PublishBody, PublishHistoryEntry, PublishStatus, PublishStatusRecord,
};
use crate::infra::command::{CommandError, CommandResult, CommandRunner};
use crate::state::error_channel::ErrorSource;
use crate::state::{ErrorChannel, LogHub};

use super::{HistoryStore, PluginError, PluginHost, PublishContext, PublishPlugin};

/// 脚本插件配置
#[derive(Clone, Debug)]
pub struct ScriptConfig {
    pub command: String,
    pub rollback_command: Option<String>,
    pub timeout: Duration,
}

/// 脚本发布插件
pub struct ScriptPublisher {
    name: String,
    description: String,
    config: ScriptConfig,
    history: Arc<HistoryStore>,
    log_hub: Arc<LogHub>,
    errors: Arc<ErrorChannel>,
    shutdown: CancellationToken,
}

impl ScriptPublisher {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        config: ScriptConfig,
        host: &PluginHost,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            config,
            history: Arc::new(HistoryStore::new(host.history_limit)),
            log_hub: host.log_hub.clone(),
            errors: host.errors.clone(),
            shutdown: host.shutdown.clone(),
        }
    }
}

/// 传给脚本的环境变量
fn script_env(ctx: &PublishContext, version: &str, comment: Option<&str>) -> Vec<(String, String)> {
    let mut envs = vec![
        ("PUBLISH_PROJECT_ID".to_string(), ctx.project_id().to_string()),
        ("PUBLISH_PROJECT_NAME".to_string(), ctx.project.name.clone()),
        (
            "PUBLISH_PROJECT_DIR".to_string(),
            ctx.project.dir().display().to_string(),
        ),
        ("PUBLISH_TARGET".to_string(), ctx.target_name().to_string()),
        ("PUBLISH_VERSION".to_string(), version.to_string()),
        (
            "PUBLISH_CONFIGURATION".to_string(),
            ctx.target.configuration.to_string(),
        ),
    ];
    if let Some(comment) = comment {
        envs.push(("PUBLISH_COMMENT".to_string(), comment.to_string()));
    }
    envs
}

/// 日志流地址
fn stream_url(log_id: &str) -> String {
    format!("/logs/{}/stream", log_id)
}

/// 把命令结果转换为终态记录
fn outcome(
    ctx_project: &str,
    ctx_target: &str,
    action: &str,
    result: Result<CommandResult, CommandError>,
) -> PublishStatusRecord {
    let (status, message) = match result {
        Ok(r) if r.success() => (PublishStatus::Succeeded, format!("{} script finished", action)),
        Ok(r) if r.timed_out => (PublishStatus::Failed, format!("{} script timed out", action)),
        Ok(r) => (
            PublishStatus::Failed,
            format!(
                "{} script exited with code {}",
                action,
                r.status.code().unwrap_or(-1)
            ),
        ),
        Err(e) => (PublishStatus::Failed, format!("{} script failed: {}", action, e)),
    };
    PublishStatusRecord::new(ctx_project, ctx_target, status, message)
}

#[async_trait]
impl PublishPlugin for ScriptPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn features(&self) -> PluginFeatures {
        PluginFeatures {
            rollback: self.config.rollback_command.is_some(),
            ..PluginFeatures::all()
        }
    }

    async fn publish(
        &self,
        ctx: &PublishContext,
        version: &str,
        body: &PublishBody,
    ) -> Result<PublishStatusRecord, PluginError> {
        let log_tx = self.log_hub.create(version).await;

        let running = PublishStatusRecord::new(
            ctx.project_id(),
            ctx.target_name(),
            PublishStatus::Running,
            "Publish script started",
        )
        .with_version(version)
        .with_comment(body.comment.clone())
        .with_log(stream_url(version));
        self.history.record(running.clone()).await;

        let envs = script_env(ctx, version, body.comment.as_deref());
        let command = self.config.command.clone();
        let timeout = self.config.timeout;
        let work_dir: PathBuf = ctx.project.dir().to_path_buf();
        let cancel = self.shutdown.child_token();
        let history = self.history.clone();
        let log_hub = self.log_hub.clone();
        let errors = self.errors.clone();
        let plugin = self.name.clone();
        let project_id = ctx.project_id().to_string();
        let target = ctx.target_name().to_string();
        let version = version.to_string();
        let comment = body.comment.clone();

        tokio::spawn(async move {
            let _ = log_tx.send(LogLine::system(format!(
                "Publishing {} to target '{}'",
                version, target
            )));

            let result = CommandRunner::run_shell_with_streaming(
                &command,
                &work_dir,
                &envs,
                log_tx.clone(),
                cancel,
                timeout,
            )
            .await;

            // 脚本无法启动属于插件配置问题，上报为应用错误
            match &result {
                Err(CommandError::Cancelled) | Ok(_) => {}
                Err(e) => {
                    errors.report(
                        ErrorSource::Task,
                        format!("Plugin '{}' could not run its publish script: {}", plugin, e),
                    );
                }
            }

            let record = outcome(&project_id, &target, "Publish", result)
                .with_version(version.clone())
                .with_comment(comment)
                .with_log(stream_url(&version));

            if record.status == PublishStatus::Succeeded {
                info!(plugin = %plugin, project_id = %project_id, target = %target, version = %version, "Script publish succeeded");
            } else {
                warn!(plugin = %plugin, project_id = %project_id, target = %target, version = %version, message = %record.message, "Script publish failed");
            }
            let _ = log_tx.send(LogLine::system(record.message.clone()));

            history.complete(record).await;
            log_hub.finish(&version).await;
        });

        Ok(running)
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
        let command = self
            .config
            .rollback_command
            .as_deref()
            .ok_or(PluginError::Unsupported("rollback"))?;

        let version = self
            .history
            .rollback_version(ctx.project_id(), ctx.target_name(), version, None)
            .await?;

        let log_id = format!("rollback-{}", uuid::Uuid::new_v4());
        let log_tx = self.log_hub.create(&log_id).await;

        let mut envs = script_env(ctx, &version, None);
        envs.push(("PUBLISH_ROLLBACK_VERSION".to_string(), version.clone()));

        let result = CommandRunner::run_shell_with_streaming(
            command,
            ctx.project.dir(),
            &envs,
            log_tx,
            self.shutdown.child_token(),
            self.config.timeout,
        )
        .await;
        self.log_hub.finish(&log_id).await;

        let mut record = outcome(ctx.project_id(), ctx.target_name(), "Rollback", result)
            .with_version(version.clone())
            .with_log(stream_url(&log_id));
        if record.status == PublishStatus::Succeeded {
            record.message = format!("Rolled back to {}", version);
        }

        info!(
            plugin = %self.name,
            project_id = %ctx.project_id(),
            target = %ctx.target_name(),
            version = %version,
            status = record.status.as_str(),
            "Script rollback finished"
        );

        self.history.record(record.clone()).await;
        Ok(record)
    }
}
