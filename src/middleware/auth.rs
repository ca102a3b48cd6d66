//! API Key 认证
//!
//! 发布、回滚、项目写操作和错误确认都要求 `x-api-key`。
//! 未配置 API Key 时拒绝所有写操作

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HeaderMap, request::Parts},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// API Key 请求头
pub const API_KEY_HEADER: &str = "x-api-key";

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRejection {
    /// 请求未携带 API Key
    Missing,
    /// API Key 不匹配
    Mismatch,
    /// 服务端未配置 API Key
    NotConfigured,
}

impl KeyRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRejection::Missing => "missing",
            KeyRejection::Mismatch => "mismatch",
            KeyRejection::NotConfigured => "not_configured",
        }
    }
}

/// 写操作的认证 extractor，放在 handler 参数的第一位
#[derive(Debug, Clone)]
pub struct RequireApiKey;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match check_api_key(&parts.headers, &state.api_key) {
            Ok(()) => Ok(RequireApiKey),
            Err(reason) => {
                tracing::warn!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    reason = reason.as_str(),
                    "Rejected unauthenticated write request"
                );
                Err(ApiError::unauthorized())
            }
        }
    }
}

/// 校验请求头中的 API Key
pub fn check_api_key(headers: &HeaderMap, expected: &str) -> Result<(), KeyRejection> {
    if expected.is_empty() {
        return Err(KeyRejection::NotConfigured);
    }

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(KeyRejection::Missing)?;

    if keys_match(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(KeyRejection::Mismatch)
    }
}

/// 长度相同时逐字节比较全部内容
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
