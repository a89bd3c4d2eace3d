use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::routes::AppState;

/// 发现后端不可达时返回 `degraded`，HTTP状态仍为200
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let (status, live_workers) = match state.service.live_worker_count().await {
        Ok(count) => ("ok", json!(count)),
        Err(e) => {
            warn!(error = %e, "健康检查: Worker发现后端不可用");
            ("degraded", Value::Null)
        }
    };

    Json(json!({
        "status": status,
        "service": "taskmesh",
        "version": env!("CARGO_PKG_VERSION"),
        "live_workers": live_workers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
