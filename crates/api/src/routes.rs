use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{
    callbacks::{append_task_log, is_valid_srv_token, set_result_status},
    health::health_check,
    tasks::{
        call_task, get_result, kill_task, list_task_logs, paged_list_results,
        paged_list_schedules, paged_list_tasks,
    },
    workers::list_workers,
};
use crate::task_service::TaskService;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
}

/// 创建RPC路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 终端用户
        .route("/rpc/call_task", post(call_task))
        .route("/rpc/kill_task", post(kill_task))
        .route("/rpc/get_result", post(get_result))
        .route("/rpc/list_task_logs", post(list_task_logs))
        .route("/rpc/paged_list_results", post(paged_list_results))
        .route("/rpc/paged_list_tasks", post(paged_list_tasks))
        .route("/rpc/paged_list_schedules", post(paged_list_schedules))
        .route("/rpc/list_workers", post(list_workers))
        // Worker回调
        .route("/rpc/set_result_status", post(set_result_status))
        .route("/rpc/append_task_log", post(append_task_log))
        .route("/rpc/is_valid_srv_token", post(is_valid_srv_token))
        .with_state(state)
}
