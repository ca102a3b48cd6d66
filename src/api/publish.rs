//! 发布 API
//!
//! 包含 /publish/types, /publish/:project_id/{status,publish,history,rollback}/:target,
//! /logs/:log_id/stream 端点

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::publish::{
    PublishBody, PublishHistoryEntry, PublishStatusRecord, PublishTargetType, RollbackBody,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequireApiKey;
use crate::services::publisher;
use crate::state::{AppState, LogSubscription};

/// 发布目标类型列表
#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub types: Vec<PublishTargetType>,
}

/// 状态响应
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: PublishStatusRecord,
}

/// 历史响应
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: PublishHistoryEntry,
}

/// 创建发布路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/publish/types", get(get_types))
        .route("/publish/:project_id/status/:target", get(get_status))
        .route("/publish/:project_id/publish/:target", post(publish))
        .route("/publish/:project_id/history/:target", get(get_history))
        .route("/publish/:project_id/rollback/:target", post(rollback))
        .route("/logs/:log_id/stream", get(stream_logs))
}

/// 列出已注册的发布目标类型
///
/// GET /publish/types
async fn get_types(State(state): State<Arc<AppState>>) -> Json<TypesResponse> {
    Json(TypesResponse {
        types: publisher::get_types(&state),
    })
}

/// 查询发布状态
///
/// GET /publish/:project_id/status/:target
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path((project_id, target)): Path<(String, String)>,
) -> ApiResult<Json<StatusResponse>> {
    let status = publisher::status(&state, &project_id, &target).await?;
    Ok(Json(StatusResponse { status }))
}

/// 发布项目
///
/// POST /publish/:project_id/publish/:target
/// 需要 API Key；请求体可省略
async fn publish(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path((project_id, target)): Path<(String, String)>,
    body: Option<Json<PublishBody>>,
) -> ApiResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let status = publisher::publish(&state, &project_id, &target, body).await?;
    Ok((StatusCode::ACCEPTED, Json(StatusResponse { status })))
}

/// 查询发布历史
///
/// GET /publish/:project_id/history/:target
/// 从未发布过时返回 400
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path((project_id, target)): Path<(String, String)>,
) -> ApiResult<Json<HistoryResponse>> {
    let history = publisher::history(&state, &project_id, &target).await?;
    Ok(Json(HistoryResponse { history }))
}

/// 回滚
///
/// POST /publish/:project_id/rollback/:target
/// 需要 API Key；从未发布过时返回 400
async fn rollback(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path((project_id, target)): Path<(String, String)>,
    body: Option<Json<RollbackBody>>,
) -> ApiResult<Json<StatusResponse>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let status = publisher::rollback(&state, &project_id, &target, body).await?;
    Ok(Json(StatusResponse { status }))
}

/// 流式发布日志
///
/// GET /logs/:log_id/stream
async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(log_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state
        .log_hub
        .subscribe(&log_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Publish log '{}'", log_id)))?;

    let stream = async_stream::stream! {
        // 已完成的通道直接发送 complete
        if let LogSubscription::Live(mut rx) = subscription {
            loop {
                match rx.recv().await {
                    Ok(log_line) => {
                        let json = serde_json::to_string(&log_line).unwrap_or_default();
                        yield Ok(Event::default().data(json));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(log_id = %log_id, lagged = n, "Log subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        yield Ok(Event::default().event("complete").data(
            serde_json::json!({ "log_id": log_id }).to_string()
        ));
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}
