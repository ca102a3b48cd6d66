//! 应用错误通道
//!
//! 未恢复的失败（panic、后台任务失败）统一写入这里，
//! 作为应用级错误状态，显式确认后清除

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::env::constants::MAX_RECENT_ERRORS;

/// 错误来源
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Panic,
    Task,
}

/// 应用错误
#[derive(Clone, Debug, Serialize)]
pub struct AppError {
    pub id: String,
    pub source: ErrorSource,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    current: Option<AppError>,
    recent: VecDeque<AppError>,
}

/// 应用错误通道
///
/// panic hook 是同步回调，所以这里用 std Mutex
#[derive(Default)]
pub struct ErrorChannel {
    inner: Mutex<Inner>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // panic hook 中持锁时再 panic 会污染锁，继续使用其中的数据
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 记录错误并设为当前错误
    pub fn report(&self, source: ErrorSource, message: impl Into<String>) -> AppError {
        let error = AppError {
            id: uuid::Uuid::new_v4().to_string(),
            source,
            message: message.into(),
            occurred_at: Utc::now(),
        };

        let mut inner = self.lock();
        inner.current = Some(error.clone());
        inner.recent.push_front(error.clone());
        while inner.recent.len() > MAX_RECENT_ERRORS {
            inner.recent.pop_back();
        }
        error
    }

    /// 当前未确认的错误
    pub fn current(&self) -> Option<AppError> {
        self.lock().current.clone()
    }

    /// 最近的错误，最新的在前
    pub fn recent(&self) -> Vec<AppError> {
        self.lock().recent.iter().cloned().collect()
    }

    /// 确认当前错误
    ///
    /// 指定 id 时只有 id 匹配才清除；返回是否清除
    pub fn acknowledge(&self, id: Option<&str>) -> bool {
        let mut inner = self.lock();
        let matches = match (&inner.current, id) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(id)) => current.id == id,
        };
        if matches {
            inner.current = None;
        }
        matches
    }
}

/// panic hook 注册句柄，drop 时恢复注册前的 hook
pub struct PanicHookGuard {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

/// 注册进程级 panic hook，把 panic 写入错误通道后交给原 hook 输出
pub fn install_panic_hook(channel: Arc<ErrorChannel>) -> PanicHookGuard {
    let previous = Arc::new(std::panic::take_hook());
    let chained = previous.clone();

    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let message = match info.location() {
            Some(location) => format!("{} at {}:{}", payload, location.file(), location.line()),
            None => payload,
        };

        tracing::error!(message = %message, "Unrecovered panic");
        channel.report(ErrorSource::Panic, message);
        (*chained)(info);
    }));

    PanicHookGuard {
        restore: Some(Box::new(move || {
            let _ = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| (*previous)(info)));
        })),
    }
}
