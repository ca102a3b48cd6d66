//! 发布台账
//!
//! 记录每个 (project, target) 的发布状态机，
//! 控制器在调用插件之前据此判断"从未发布"等状态

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::publish::{PublishState, PublishStatus, PublishStatusRecord};
use crate::error::PublishError;

/// 单个发布目标的台账
#[derive(Clone, Debug, Default, Serialize)]
pub struct LedgerEntry {
    pub state: PublishState,
    /// 是否有过成功发布
    pub has_succeeded: bool,
    /// 最近一次成功的版本
    pub last_success: Option<String>,
    /// 正在发布的版本
    pub pending_version: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// 是否可以回滚
    pub fn can_roll_back(&self) -> bool {
        match self.state {
            PublishState::Published => true,
            PublishState::PublishFailed => self.has_succeeded,
            PublishState::NeverPublished | PublishState::Publishing => false,
        }
    }
}

type Key = (String, String);

/// 发布台账
pub struct PublishLedger {
    entries: RwLock<HashMap<Key, LedgerEntry>>,
}

impl PublishLedger {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(project_id: &str, target: &str) -> Key {
        (project_id.to_string(), target.to_string())
    }

    /// 查询台账，未记录时为 `NeverPublished`
    pub async fn get(&self, project_id: &str, target: &str) -> LedgerEntry {
        let entries = self.entries.read().await;
        entries
            .get(&Self::key(project_id, target))
            .cloned()
            .unwrap_or_default()
    }

    /// 开始发布，已有发布进行中时返回 Conflict
    pub async fn begin(&self, project_id: &str, target: &str, version: &str) -> Result<(), PublishError> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(Self::key(project_id, target)).or_default();

        if entry.state == PublishState::Publishing {
            return Err(PublishError::Conflict(format!(
                "target '{}' of project '{}' is already publishing version {}",
                target,
                project_id,
                entry.pending_version.as_deref().unwrap_or("unknown")
            )));
        }

        entry.state = PublishState::Publishing;
        entry.pending_version = Some(version.to_string());
        entry.updated_at = Some(Utc::now());
        Ok(())
    }

    /// 插件调用失败时结束发布
    pub async fn abort(&self, project_id: &str, target: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&Self::key(project_id, target)) {
            entry.state = PublishState::PublishFailed;
            entry.pending_version = None;
            entry.updated_at = Some(Utc::now());
        }
    }

    /// 根据插件返回的状态记录推进状态机
    ///
    /// `Unpublished` 记录不会创建台账
    pub async fn observe(&self, record: &PublishStatusRecord) -> PublishState {
        if record.status == PublishStatus::Unpublished {
            return self.get(&record.project_id, &record.target).await.state;
        }

        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(Self::key(&record.project_id, &record.target))
            .or_default();

        entry.state = entry.state.observe(record.status);
        match record.status {
            PublishStatus::Succeeded => {
                entry.has_succeeded = true;
                entry.last_success = record.version.clone();
                entry.pending_version = None;
            }
            PublishStatus::Failed => entry.pending_version = None,
            PublishStatus::Running => {
                if record.version.is_some() {
                    entry.pending_version = record.version.clone();
                }
            }
            PublishStatus::Unpublished => {}
        }
        entry.updated_at = Some(Utc::now());
        entry.state
    }

    /// 有台账的目标数
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 正在发布的目标数
    pub async fn publishing_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.state == PublishState::Publishing)
            .count()
    }
}

impl Default for PublishLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: PublishStatus, version: &str) -> PublishStatusRecord {
        PublishStatusRecord::new("p1", "default", status, "").with_version(version)
    }

    #[tokio::test]
    async fn test_never_published_by_default() {
        let ledger = PublishLedger::new();
        let entry = ledger.get("p1", "default").await;
        assert_eq!(entry.state, PublishState::NeverPublished);
        assert!(!entry.can_roll_back());

        // unpublished 状态不会写入台账
        ledger.observe(&PublishStatusRecord::unpublished("p1", "default")).await;
        assert_eq!(ledger.count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_lifecycle() {
        let ledger = PublishLedger::new();

        ledger.begin("p1", "default", "v1").await.unwrap();
        assert_eq!(ledger.get("p1", "default").await.state, PublishState::Publishing);
        assert_eq!(ledger.publishing_count().await, 1);

        // 发布进行中不能再次发布
        let err = ledger.begin("p1", "default", "v2").await.unwrap_err();
        assert!(matches!(err, PublishError::Conflict(_)));

        let state = ledger.observe(&record(PublishStatus::Succeeded, "v1")).await;
        assert_eq!(state, PublishState::Published);

        let entry = ledger.get("p1", "default").await;
        assert!(entry.can_roll_back());
        assert_eq!(entry.last_success.as_deref(), Some("v1"));
        assert!(entry.pending_version.is_none());
    }

    #[tokio::test]
    async fn test_failed_publish_rollback_rules() {
        let ledger = PublishLedger::new();

        ledger.begin("p1", "default", "v1").await.unwrap();
        ledger.observe(&record(PublishStatus::Failed, "v1")).await;
        let entry = ledger.get("p1", "default").await;
        assert_eq!(entry.state, PublishState::PublishFailed);
        assert!(!entry.can_roll_back());

        ledger.begin("p1", "default", "v2").await.unwrap();
        ledger.observe(&record(PublishStatus::Succeeded, "v2")).await;
        ledger.begin("p1", "default", "v3").await.unwrap();
        ledger.abort("p1", "default").await;

        // 失败但之前成功过，可以回滚
        let entry = ledger.get("p1", "default").await;
        assert_eq!(entry.state, PublishState::PublishFailed);
        assert!(entry.can_roll_back());
    }

    #[tokio::test]
    async fn test_targets_are_independent() {
        let ledger = PublishLedger::new();
        ledger.begin("p1", "default", "v1").await.unwrap();
        ledger.observe(&record(PublishStatus::Succeeded, "v1")).await;

        assert_eq!(ledger.get("p1", "prod").await.state, PublishState::NeverPublished);
        assert_eq!(ledger.get("p2", "default").await.state, PublishState::NeverPublished);
    }
}
