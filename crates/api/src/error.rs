use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use taskmesh_core::TaskMeshError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    TaskMesh(#[from] TaskMeshError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

/// 错误响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::TaskMesh(e) => e.code(),
            ApiError::BadRequest(_) => "BAD_REQUEST",
        }
    }

    pub fn status(&self) -> StatusCode {
        let ApiError::TaskMesh(e) = self else {
            return StatusCode::BAD_REQUEST;
        };
        match e {
            TaskMeshError::Validation(_) | TaskMeshError::InvalidCron { .. } => {
                StatusCode::BAD_REQUEST
            }
            TaskMeshError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskMeshError::Auth(_) => StatusCode::UNAUTHORIZED,
            TaskMeshError::Forbidden(_) => StatusCode::FORBIDDEN,
            TaskMeshError::InvalidTransition { .. } => StatusCode::CONFLICT,
            TaskMeshError::NoWorkerAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TaskMeshError::DispatchFailure(_) => StatusCode::BAD_GATEWAY,
            TaskMeshError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "请求处理失败");
        } else {
            tracing::debug!(code = self.code(), error = %self, "请求被拒绝");
        }
        (status, Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
