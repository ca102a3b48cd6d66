//! 项目 API
//!
//! 包含 /projects/open, /projects/:project_id, /projects/:project_id/save-as 端点

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::project::{BotProject, ProjectLocation};
use crate::error::ApiResult;
use crate::middleware::RequireApiKey;
use crate::state::AppState;

/// 打开/另存为响应
#[derive(Debug, Serialize)]
pub struct ProjectIdResponse {
    pub id: String,
}

/// 创建项目路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects/open", post(open_project))
        .route("/projects/:project_id", get(get_project))
        .route("/projects/:project_id/save-as", post(save_project_as))
}

/// 打开项目
///
/// POST /projects/open
/// 需要 API Key
async fn open_project(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Json(location): Json<ProjectLocation>,
) -> ApiResult<Json<ProjectIdResponse>> {
    let id = state.projects.open(&location).await?;
    Ok(Json(ProjectIdResponse { id }))
}

/// 获取项目
///
/// GET /projects/:project_id
async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<BotProject>> {
    let project = state.projects.get_by_id(&project_id).await?;
    Ok(Json(project))
}

/// 项目另存为
///
/// POST /projects/:project_id/save-as
/// 需要 API Key；返回新项目 ID，发布状态不会继承
async fn save_project_as(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(location): Json<ProjectLocation>,
) -> ApiResult<Json<ProjectIdResponse>> {
    let project = state.projects.get_by_id(&project_id).await?;
    let id = state.projects.save_as(&project, &location).await?;

    tracing::info!(from = %project_id, to = %id, "Project saved as new location");
    Ok(Json(ProjectIdResponse { id }))
}
