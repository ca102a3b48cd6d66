//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod errors;
pub mod health;
pub mod projects;
pub mod publish;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::error::ErrorResponse;
use crate::state::AppState;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & Status
        .merge(health::router())
        // Publish
        .merge(publish::router())
        // Projects
        .merge(projects::router())
        // Application errors
        .merge(errors::router())
        // Middleware
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// handler panic 转换为 500，记录由进程级 panic hook 完成
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    let body = ErrorResponse::new("internal_error", "Request handler panicked").with_details(details);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
