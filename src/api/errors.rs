//! 应用错误 API
//!
//! 包含 /errors, /errors/ack 端点

use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::middleware::RequireApiKey;
use crate::state::error_channel::AppError;
use crate::state::AppState;

/// 当前错误响应
#[derive(Debug, Serialize)]
pub struct ErrorsResponse {
    pub current: Option<AppError>,
    pub recent: Vec<AppError>,
}

/// 确认请求
#[derive(Debug, Default, Deserialize)]
pub struct AckRequest {
    /// 要确认的错误 ID，缺省确认当前错误
    pub id: Option<String>,
}

/// 确认响应
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub cleared: bool,
}

/// 创建错误路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/errors", get(get_errors))
        .route("/errors/ack", post(acknowledge))
}

/// 当前应用错误
///
/// GET /errors
async fn get_errors(State(state): State<Arc<AppState>>) -> Json<ErrorsResponse> {
    Json(ErrorsResponse {
        current: state.errors.current(),
        recent: state.errors.recent(),
    })
}

/// 确认应用错误
///
/// POST /errors/ack
/// 需要 API Key
async fn acknowledge(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    body: Option<Json<AckRequest>>,
) -> Json<AckResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let cleared = state.errors.acknowledge(request.id.as_deref());
    if cleared {
        tracing::info!(id = ?request.id, "Application error acknowledged");
    }
    Json(AckResponse { cleared })
}
