//! 日志通道管理
//!
//! 发布任务的日志广播通道，按版本号索引，供 SSE 订阅

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use crate::domain::log::LogLine;

/// 日志通道容量
const LOG_CHANNEL_CAPACITY: usize = 256;

/// 日志通道信息
struct LogChannel {
    /// 完成后释放，已有订阅者随之收到 Closed
    sender: Option<broadcast::Sender<LogLine>>,
    created_at: DateTime<Utc>,
    finished: bool,
}

/// 订阅结果
#[derive(Debug)]
pub enum LogSubscription {
    /// 通道仍在输出
    Live(broadcast::Receiver<LogLine>),
    /// 通道已完成，没有后续输出
    Finished,
}

/// 日志中心
pub struct LogHub {
    /// 通道映射 (log_id -> LogChannel)
    channels: RwLock<HashMap<String, LogChannel>>,
}

impl LogHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// 创建新的日志通道
    ///
    /// 如果通道已存在且未完成，返回现有的发送者
    pub async fn create(&self, log_id: &str) -> broadcast::Sender<LogLine> {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(log_id).and_then(|c| c.sender.clone()) {
            return sender;
        }

        let (sender, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        channels.insert(
            log_id.to_string(),
            LogChannel {
                sender: Some(sender.clone()),
                created_at: Utc::now(),
                finished: false,
            },
        );

        sender
    }

    /// 订阅日志通道，不存在时返回 None
    pub async fn subscribe(&self, log_id: &str) -> Option<LogSubscription> {
        let channels = self.channels.read().await;
        channels.get(log_id).map(|c| match &c.sender {
            Some(sender) => LogSubscription::Live(sender.subscribe()),
            None => LogSubscription::Finished,
        })
    }

    /// 标记通道完成
    ///
    /// 释放中心持有的发送者，通道本身保留到过期清理
    pub async fn finish(&self, log_id: &str) {
        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get_mut(log_id) {
            channel.finished = true;
            channel.sender = None;
        }
    }

    /// 移除创建时间超过指定时长的已完成通道
    pub async fn cleanup_expired(&self, max_age_hours: i64) {
        let now = Utc::now();
        let mut channels = self.channels.write().await;
        channels.retain(|_, channel| {
            let age = now - channel.created_at;
            age.num_hours() < max_age_hours || !channel.finished
        });
    }

    /// 通道数量（含已完成）
    pub async fn count(&self) -> usize {
        let channels = self.channels.read().await;
        channels.len()
    }

    /// 活跃通道数量（未完成）
    pub async fn active_count(&self) -> usize {
        let channels = self.channels.read().await;
        channels.values().filter(|c| !c.finished).count()
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new()
    }
}
