//! 发布控制器
//!
//! 请求校验 → 项目解析 → 目标解析 → 台账状态检查 → 调用插件。
//! 控制器本身不持有状态：台账在 `AppState.ledger`，发布记录由插件维护

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::project::resolve_target;
use crate::domain::publish::{
    PublishBody, PublishHistoryEntry, PublishState, PublishStatusRecord, PublishTargetType,
    RollbackBody,
};
use crate::error::PublishError;
use crate::plugins::{PublishContext, PublishPlugin};
use crate::state::AppState;

/// projectId / target 最大长度
const MAX_ID_LEN: usize = 128;

/// 插件能力
#[derive(Clone, Copy, Debug)]
enum Feature {
    Publish,
    Status,
    History,
    Rollback,
}

impl Feature {
    fn as_str(&self) -> &'static str {
        match self {
            Feature::Publish => "publish",
            Feature::Status => "status",
            Feature::History => "history",
            Feature::Rollback => "rollback",
        }
    }
}

/// 解析后的发布目标
struct Resolved {
    ctx: PublishContext,
    plugin: Arc<dyn PublishPlugin>,
}

impl Resolved {
    fn require(&self, feature: Feature) -> Result<(), PublishError> {
        let features = self.plugin.features();
        let supported = match feature {
            Feature::Publish => features.publish,
            Feature::Status => features.status,
            Feature::History => features.history,
            Feature::Rollback => features.rollback,
        };
        if supported {
            Ok(())
        } else {
            Err(PublishError::Unsupported {
                target_type: self.ctx.target.target_type.clone(),
                feature: feature.as_str(),
            })
        }
    }

    fn project_id(&self) -> &str {
        self.ctx.project_id()
    }

    fn target(&self) -> &str {
        self.ctx.target_name()
    }
}

/// 校验 projectId / target
fn validate_id(field: &str, value: &str) -> Result<(), PublishError> {
    if value.is_empty() {
        return Err(PublishError::InvalidRequest(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(PublishError::InvalidRequest(format!(
            "{} exceeds {} characters",
            field, MAX_ID_LEN
        )));
    }
    if value.starts_with('.')
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(PublishError::InvalidRequest(format!(
            "{} '{}' contains invalid characters",
            field, value
        )));
    }
    Ok(())
}

/// 解析项目与目标插件，任何失败都发生在调用插件之前
async fn resolve(state: &AppState, project_id: &str, target: &str) -> Result<Resolved, PublishError> {
    validate_id("projectId", project_id)?;
    validate_id("target", target)?;

    let project = state.projects.get_by_id(project_id).await?;

    let publish_target = resolve_target(&project.settings, target)
        .ok_or_else(|| PublishError::NotFound(format!("Publish target '{}'", target)))?;

    let plugin = state
        .plugins
        .get(&publish_target.target_type)
        .ok_or_else(|| PublishError::InvalidTarget(publish_target.target_type.clone()))?;

    Ok(Resolved {
        ctx: PublishContext {
            project,
            target: publish_target,
        },
        plugin,
    })
}

/// 台账处于 Publishing 时向插件刷新一次状态
async fn refresh_if_publishing(state: &AppState, resolved: &Resolved) {
    let entry = state.ledger.get(resolved.project_id(), resolved.target()).await;
    if entry.state != PublishState::Publishing || resolved.require(Feature::Status).is_err() {
        return;
    }

    match resolved.plugin.status(&resolved.ctx).await {
        Ok(record) => {
            let ledger_state = state.ledger.observe(&record).await;
            if record.status.is_terminal() {
                info!(
                    project_id = %resolved.project_id(),
                    target = %resolved.target(),
                    version = ?record.version,
                    state = ledger_state.as_str(),
                    "Publish finished"
                );
            }
        }
        Err(e) => warn!(
            project_id = %resolved.project_id(),
            target = %resolved.target(),
            error = %e,
            "Failed to refresh publish status"
        ),
    }
}

/// 列出已注册的发布目标类型
pub fn get_types(state: &AppState) -> Vec<PublishTargetType> {
    state.plugins.types()
}

/// 查询最近一次发布状态
pub async fn status(
    state: &AppState,
    project_id: &str,
    target: &str,
) -> Result<PublishStatusRecord, PublishError> {
    let resolved = resolve(state, project_id, target).await?;
    resolved.require(Feature::Status)?;

    let record = resolved.plugin.status(&resolved.ctx).await?;
    let ledger_state = state.ledger.observe(&record).await;

    debug!(
        project_id = %project_id,
        target = %target,
        status = record.status.as_str(),
        state = ledger_state.as_str(),
        "Publish status"
    );
    Ok(record)
}

/// 发布新版本
pub async fn publish(
    state: &AppState,
    project_id: &str,
    target: &str,
    body: PublishBody,
) -> Result<PublishStatusRecord, PublishError> {
    let resolved = resolve(state, project_id, target).await?;
    resolved.require(Feature::Publish)?;
    refresh_if_publishing(state, &resolved).await;

    let version = uuid::Uuid::new_v4().to_string();
    state.ledger.begin(project_id, target, &version).await?;

    info!(
        project_id = %project_id,
        target = %target,
        target_type = %resolved.ctx.target.target_type,
        plugin = %resolved.plugin.name(),
        version = %version,
        "Publishing project"
    );

    match resolved.plugin.publish(&resolved.ctx, &version, &body).await {
        Ok(record) => {
            let ledger_state = state.ledger.observe(&record).await;
            info!(
                project_id = %project_id,
                target = %target,
                version = %version,
                status = record.status.as_str(),
                state = ledger_state.as_str(),
                "Publish dispatched"
            );
            Ok(record)
        }
        Err(e) => {
            state.ledger.abort(project_id, target).await;
            Err(e.into())
        }
    }
}

/// 查询发布历史
///
/// 从未发布过的目标返回 `NoHistory`，不会调用插件
pub async fn history(
    state: &AppState,
    project_id: &str,
    target: &str,
) -> Result<PublishHistoryEntry, PublishError> {
    let resolved = resolve(state, project_id, target).await?;

    let entry = state.ledger.get(project_id, target).await;
    if entry.state == PublishState::NeverPublished {
        return Err(PublishError::NoHistory {
            project_id: project_id.to_string(),
            target: target.to_string(),
        });
    }
    resolved.require(Feature::History)?;

    let history = resolved.plugin.history(&resolved.ctx).await?;
    debug!(project_id = %project_id, target = %target, records = history.len(), "Publish history");
    Ok(history)
}

/// 回滚到之前的成功版本
pub async fn rollback(
    state: &AppState,
    project_id: &str,
    target: &str,
    body: RollbackBody,
) -> Result<PublishStatusRecord, PublishError> {
    let resolved = resolve(state, project_id, target).await?;
    refresh_if_publishing(state, &resolved).await;

    let entry = state.ledger.get(project_id, target).await;
    match entry.state {
        PublishState::NeverPublished => {
            return Err(PublishError::NoHistory {
                project_id: project_id.to_string(),
                target: target.to_string(),
            })
        }
        PublishState::Publishing => {
            return Err(PublishError::Conflict(format!(
                "target '{}' is still publishing",
                target
            )))
        }
        _ if !entry.can_roll_back() => {
            return Err(PublishError::InvalidState(format!(
                "target '{}' has no successful publish to roll back to",
                target
            )))
        }
        _ => {}
    }
    if let (PublishState::Published, Some(requested)) = (entry.state, body.version.as_deref()) {
        if entry.last_success.as_deref() == Some(requested) {
            return Err(PublishError::InvalidState(format!(
                "version '{}' is already live on target '{}'",
                requested, target
            )));
        }
    }
    resolved.require(Feature::Rollback)?;

    let record = resolved
        .plugin
        .rollback(&resolved.ctx, body.version.as_deref())
        .await?;
    let ledger_state = state.ledger.observe(&record).await;

    info!(
        project_id = %project_id,
        target = %target,
        version = ?record.version,
        status = record.status.as_str(),
        state = ledger_state.as_str(),
        "Rollback finished"
    );
    Ok(record)
}
