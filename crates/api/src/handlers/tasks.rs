use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use taskmesh_core::models::{
    Paged, ResultFilter, ResultStatus, ScheduleDefinition, ScheduleFilter, TaskDefinition,
    TaskDefinitionFilter, TaskLog, TaskResult,
};

use super::{bearer, PagingParams};
use crate::{error::ApiResult, routes::AppState, task_service::CallTaskRequest};

#[derive(Debug, Serialize, Deserialize)]
pub struct CallTaskResponse {
    pub task_unique_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskUniqueIdRequest {
    pub task_unique_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTaskLogsRequest {
    pub task_unique_id: String,
    #[serde(flatten)]
    pub paging: PagingParams,
}

#[derive(Debug, Deserialize)]
pub struct ListResultsRequest {
    pub partition_label: String,
    pub task_codename: Option<String>,
    pub status: Option<ResultStatus>,
    pub caller: Option<String>,
    #[serde(flatten)]
    pub paging: PagingParams,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksRequest {
    #[serde(flatten)]
    pub filter: TaskDefinitionFilter,
    #[serde(flatten)]
    pub paging: PagingParams,
}

#[derive(Debug, Deserialize)]
pub struct ListSchedulesRequest {
    #[serde(flatten)]
    pub filter: ScheduleFilter,
    #[serde(flatten)]
    pub paging: PagingParams,
}

pub async fn call_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CallTaskRequest>, JsonRejection>,
) -> ApiResult<Json<CallTaskResponse>> {
    let Json(request) = payload?;
    let task_unique_id = state.service.call_task(bearer(&headers)?, request).await?;
    Ok(Json(CallTaskResponse { task_unique_id }))
}

pub async fn kill_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TaskUniqueIdRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    state
        .service
        .kill_task(bearer(&headers)?, &request.task_unique_id)
        .await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn get_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TaskUniqueIdRequest>, JsonRejection>,
) -> ApiResult<Json<TaskResult>> {
    let Json(request) = payload?;
    let result = state
        .service
        .get_result(bearer(&headers)?, &request.task_unique_id)
        .await?;
    Ok(Json(result))
}

pub async fn list_task_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ListTaskLogsRequest>, JsonRejection>,
) -> ApiResult<Json<Paged<TaskLog>>> {
    let Json(request) = payload?;
    let logs = state
        .service
        .list_task_logs(
            bearer(&headers)?,
            &request.task_unique_id,
            request.paging.page_request(),
        )
        .await?;
    Ok(Json(logs))
}

pub async fn paged_list_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ListResultsRequest>, JsonRejection>,
) -> ApiResult<Json<Paged<TaskResult>>> {
    let Json(request) = payload?;
    let filter = ResultFilter {
        task_codename: request.task_codename,
        status: request.status,
        caller: request.caller,
    };
    let results = state
        .service
        .paged_list_results(
            bearer(&headers)?,
            &request.partition_label,
            &filter,
            request.paging.page_request(),
        )
        .await?;
    Ok(Json(results))
}

pub async fn paged_list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ListTasksRequest>, JsonRejection>,
) -> ApiResult<Json<Paged<TaskDefinition>>> {
    let Json(request) = payload?;
    let tasks = state
        .service
        .paged_list_tasks(
            bearer(&headers)?,
            &request.filter,
            request.paging.page_request(),
        )
        .await?;
    Ok(Json(tasks))
}

pub async fn paged_list_schedules(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ListSchedulesRequest>, JsonRejection>,
) -> ApiResult<Json<Paged<ScheduleDefinition>>> {
    let Json(request) = payload?;
    let schedules = state
        .service
        .paged_list_schedules(
            bearer(&headers)?,
            &request.filter,
            request.paging.page_request(),
        )
        .await?;
    Ok(Json(schedules))
}
