//! 插件侧发布历史
//!
//! 按 (project, target) 保存状态记录，最新的在前，超出上限丢弃最旧的

use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::domain::publish::{PublishHistoryEntry, PublishStatus, PublishStatusRecord};

use super::PluginError;

type Key = (String, String);

/// 发布历史存储
pub struct HistoryStore {
    records: RwLock<HashMap<Key, VecDeque<PublishStatusRecord>>>,
    max_history: usize,
}

impl HistoryStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_history: max_history.max(1),
        }
    }

    fn key(project_id: &str, target: &str) -> Key {
        (project_id.to_string(), target.to_string())
    }

    /// 追加一条记录
    pub async fn record(&self, record: PublishStatusRecord) {
        let mut records = self.records.write().await;
        let entries = records
            .entry(Self::key(&record.project_id, &record.target))
            .or_default();
        entries.push_front(record);

        while entries.len() > self.max_history {
            entries.pop_back();
        }
    }

    /// 用终态替换同版本的 Running 记录，找不到时追加
    pub async fn complete(&self, record: PublishStatusRecord) {
        {
            let mut records = self.records.write().await;
            if let Some(entries) = records.get_mut(&Self::key(&record.project_id, &record.target)) {
                let running = entries.iter_mut().find(|r| {
                    r.status == PublishStatus::Running && r.version.is_some() && r.version == record.version
                });
                if let Some(slot) = running {
                    *slot = record;
                    return;
                }
            }
        }
        self.record(record).await;
    }

    /// 最近一条记录
    pub async fn latest(&self, project_id: &str, target: &str) -> Option<PublishStatusRecord> {
        let records = self.records.read().await;
        records
            .get(&Self::key(project_id, target))
            .and_then(|entries| entries.front().cloned())
    }

    /// 全部历史
    pub async fn list(&self, project_id: &str, target: &str) -> PublishHistoryEntry {
        let records = self.records.read().await;
        records
            .get(&Self::key(project_id, target))
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 解析回滚目标版本
    ///
    /// 指定版本时必须存在成功记录；未指定时取与当前生效版本不同的最近一次成功版本。
    /// `current` 为空时以最近一次成功版本作为当前版本
    pub async fn rollback_version(
        &self,
        project_id: &str,
        target: &str,
        requested: Option<&str>,
        current: Option<&str>,
    ) -> Result<String, PluginError> {
        let records = self.records.read().await;
        let entries = records.get(&Self::key(project_id, target));
        let mut successes = entries
            .into_iter()
            .flatten()
            .filter(|r| r.status == PublishStatus::Succeeded)
            .filter_map(|r| r.version.as_deref());

        match requested {
            Some(version) => {
                if successes.any(|v| v == version) {
                    Ok(version.to_string())
                } else {
                    Err(PluginError::VersionNotFound(version.to_string()))
                }
            }
            None => {
                let current = match current {
                    Some(version) => version,
                    None => successes.next().ok_or(PluginError::NothingToRollBack)?,
                };
                successes
                    .find(|v| *v != current)
                    .map(str::to_string)
                    .ok_or(PluginError::NothingToRollBack)
            }
        }
    }

    /// 记录总数
    pub async fn count(&self, project_id: &str, target: &str) -> usize {
        let records = self.records.read().await;
        records.get(&Self::key(project_id, target)).map_or(0, |e| e.len())
    }
}
