pub mod callbacks;
pub mod health;
pub mod tasks;
pub mod workers;

use axum::extract::rejection::JsonRejection;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Deserialize;
use taskmesh_core::{
    models::{PageRequest, SRV_TOKEN_HEADER},
    TaskMeshError,
};

use crate::error::ApiError;

/// 请求体中的分页参数，缺省时使用默认分页
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PagingParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PagingParams {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page.unwrap_or(1), self.page_size.unwrap_or(0))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// 终端用户的 `Authorization` 头
pub(crate) fn bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    header(headers, AUTHORIZATION.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TaskMeshError::Auth("缺少Authorization请求头".to_string()).into())
}

/// Worker回调的 `x-srv-token` 头，缺失时按空令牌处理
pub(crate) fn srv_token(headers: &HeaderMap) -> &str {
    header(headers, SRV_TOKEN_HEADER).unwrap_or_default()
}
