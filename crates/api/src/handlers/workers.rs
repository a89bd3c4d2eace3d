use axum::{extract::State, http::HeaderMap, Json};
use taskmesh_core::models::WorkerInfo;

use super::bearer;
use crate::{error::ApiResult, routes::AppState};

/// 当前在线的Worker列表，实时读取服务发现
pub async fn list_workers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<WorkerInfo>>> {
    let workers = state.service.list_workers(bearer(&headers)?).await?;
    Ok(Json(workers))
}
