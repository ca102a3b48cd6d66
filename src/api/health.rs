//! 健康检查 API
//!
//! 包含 /health, /status 端点

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub started_at: String,
    /// 已注册的 target type
    pub target_types: Vec<String>,
    /// 正在发布的目标数
    pub active_publishes: usize,
    /// 活跃日志通道数
    pub active_log_streams: usize,
    /// 保留中的日志通道数（含已完成）
    pub retained_log_streams: usize,
    /// 是否有未确认的应用错误
    pub has_error: bool,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(health_check))
}

/// 健康检查
///
/// GET /health, GET /status
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let target_types = state.plugins.types().into_iter().map(|t| t.name).collect();

    Json(HealthResponse {
        status: "ok",
        service: "bot-publisher",
        version: VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
        started_at: state.started_at.to_rfc3339(),
        target_types,
        active_publishes: state.ledger.publishing_count().await,
        active_log_streams: state.log_hub.active_count().await,
        retained_log_streams: state.log_hub.count().await,
        has_error: state.errors.current().is_some(),
    })
}
