//! 统一错误处理
//!
//! - `PublishError`：发布控制器与项目存储的业务错误
//! - `ApiError`：实现 `IntoResponse`，统一输出 `ErrorResponse`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::plugins::PluginError;

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 发布业务错误
#[derive(Debug, Error)]
pub enum PublishError {
    /// projectId / target 格式不合法
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// 项目不存在
    #[error("{0} not found")]
    NotFound(String),
    /// 目标无法解析到已加载的插件
    #[error("{0} is not a valid publishing target type. There may be a missing plugin.")]
    InvalidTarget(String),
    /// 从未发布过，没有历史可查/可回滚
    #[error("no publish history for target '{target}' of project '{project_id}'")]
    NoHistory { project_id: String, target: String },
    /// 当前状态不允许该操作
    #[error("{0}")]
    InvalidState(String),
    /// 插件未实现该能力
    #[error("target type '{target_type}' does not support {feature}")]
    Unsupported { target_type: String, feature: &'static str },
    /// 同一目标已有发布在进行
    #[error("{0}")]
    Conflict(String),
    /// 插件执行失败
    #[error("plugin failure: {0}")]
    PluginFailure(#[source] PluginError),
    /// 项目存储读写失败
    #[error("storage error: {0}")]
    Storage(String),
}

impl PublishError {
    /// 错误类型标识（写入 `ErrorResponse.error`）
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::InvalidRequest(_) => "invalid_request",
            PublishError::NotFound(_) => "not_found",
            PublishError::InvalidTarget(_) => "invalid_target",
            PublishError::NoHistory { .. } => "no_history",
            PublishError::InvalidState(_) => "invalid_state",
            PublishError::Unsupported { .. } => "unsupported",
            PublishError::Conflict(_) => "conflict",
            PublishError::PluginFailure(_) => "plugin_failure",
            PublishError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PublishError::InvalidRequest(_)
            | PublishError::InvalidTarget(_)
            | PublishError::NoHistory { .. }
            | PublishError::InvalidState(_)
            | PublishError::Unsupported { .. } => StatusCode::BAD_REQUEST,
            PublishError::NotFound(_) => StatusCode::NOT_FOUND,
            PublishError::Conflict(_) => StatusCode::CONFLICT,
            PublishError::PluginFailure(_) | PublishError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<PluginError> for PublishError {
    /// 回滚目标不存在属于调用方问题，其余插件错误按插件失败处理
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::NothingToRollBack => PublishError::InvalidState(err.to_string()),
            PluginError::VersionNotFound(version) => {
                PublishError::NotFound(format!("Successful publish of version '{}'", version))
            }
            other => PublishError::PluginFailure(other),
        }
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 401 - 未授权（API Key 无效或缺失）
    Unauthorized,
    /// 404 - 资源未找到
    NotFound(String),
    /// 400 - 请求无效
    BadRequest(String),
    /// 500 - 内部错误
    Internal(String),
    /// 业务错误，状态码由 `PublishError::status_code` 决定
    Publish(PublishError),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        Self::Publish(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("unauthorized", "Invalid or missing API key"),
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", format!("{} not found", resource)),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", msg))
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal_error", msg),
            ),
            ApiError::Publish(err) => {
                let status = err.status_code();
                let body = match &err {
                    // 插件错误只返回通用信息，细节放 details
                    PublishError::PluginFailure(inner) => {
                        tracing::error!(error = %inner, "Publish plugin failed");
                        ErrorResponse::new(err.kind(), "Publish plugin failed")
                            .with_details(inner.to_string())
                    }
                    PublishError::Storage(msg) => {
                        tracing::error!(error = %msg, "Project storage failed");
                        ErrorResponse::new(err.kind(), err.to_string())
                    }
                    _ => ErrorResponse::new(err.kind(), err.to_string()),
                };
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
            ApiError::Publish(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;
