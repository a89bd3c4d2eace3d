//! # TaskMesh API
//!
//! 任务服务门面及其HTTP传输层。
//!
//! ## 端点
//!
//! 所有RPC都是 `POST /rpc/<method>`，请求体和响应体为JSON：
//!
//! - 终端用户（`Authorization: Bearer <api key>`）：`call_task`、`kill_task`、`get_result`、
//!   `list_task_logs`、`paged_list_results`、`paged_list_tasks`、`paged_list_schedules`、
//!   `list_workers`
//! - Worker回调（`x-srv-token: <token>`）：`set_result_status`、`append_task_log`、
//!   `is_valid_srv_token`
//!
//! `append_task_log` 的请求体与响应体都是NDJSON，每写入一行返回一行 `{"seq": n}`；
//! 换发的回调令牌放在 `x-next-srv-token` 响应头中。
//!
//! ## 错误响应
//!
//! ```json
//! { "code": "NO_WORKER_AVAILABLE", "message": "没有可用的Worker: ..." }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod task_service;

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

pub use error::{ApiError, ApiResult, ErrorBody};
pub use task_service::{
    CallTaskRequest, CallbackError, CallbackReceipt, LogAck, LogLine, SrvTokenCheck, TaskService,
};

/// 创建完整的API应用
pub fn create_app(service: Arc<TaskService>) -> Router {
    create_routes(AppState { service }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
