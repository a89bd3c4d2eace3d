use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use taskmesh_core::{
    models::{
        WorkerAck, WorkerCallTaskRequest, WorkerInfo, WorkerKillTaskRequest, SRV_TOKEN_HEADER,
    },
    traits::WorkerClient,
    Result, TaskMeshError,
};
use tracing::{debug, warn};

/// 通过HTTP JSON调用Worker的RPC客户端
pub struct HttpWorkerClient {
    http_client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskMeshError::Internal(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { http_client })
    }

    fn endpoint(address: &str, method: &str) -> String {
        let base = address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}/rpc/{method}")
        } else {
            format!("http://{base}/rpc/{method}")
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        worker: &WorkerInfo,
        method: &str,
        srv_token: Option<&str>,
        body: &T,
    ) -> Result<WorkerAck> {
        let url = Self::endpoint(&worker.address, method);
        let mut request = self.http_client.post(&url).json(body);
        if let Some(token) = srv_token {
            request = request.header(SRV_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(worker_id = %worker.worker_id, url = %url, error = %e, "Worker RPC请求失败");
            TaskMeshError::DispatchFailure(format!("调用Worker {} 失败: {e}", worker.worker_id))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(worker_id = %worker.worker_id, %status, body = %body, "Worker RPC返回错误状态");
            return Err(TaskMeshError::DispatchFailure(format!(
                "Worker {} 返回 HTTP {status}: {body}",
                worker.worker_id
            )));
        }

        let ack = response.json::<WorkerAck>().await.map_err(|e| {
            TaskMeshError::DispatchFailure(format!("解析Worker {} 应答失败: {e}", worker.worker_id))
        })?;
        debug!(worker_id = %worker.worker_id, method, success = ack.success, "Worker RPC完成");
        Ok(ack)
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn call_task(
        &self,
        worker: &WorkerInfo,
        srv_token: &str,
        request: &WorkerCallTaskRequest,
    ) -> Result<WorkerAck> {
        self.post(worker, "call_task", Some(srv_token), request).await
    }

    async fn kill_task(
        &self,
        worker: &WorkerInfo,
        request: &WorkerKillTaskRequest,
    ) -> Result<WorkerAck> {
        self.post(worker, "kill_task", None, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use serde_json::json;

    async fn spawn_worker() -> String {
        async fn call_task(
            headers: HeaderMap,
            Json(request): Json<WorkerCallTaskRequest>,
        ) -> Json<WorkerAck> {
            let token = headers
                .get(SRV_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if token == "token-1" && request.name == "ping" {
                Json(WorkerAck::ok())
            } else {
                Json(WorkerAck::rejected(format!("unexpected {token}")))
            }
        }

        async fn kill_task(Json(_): Json<WorkerKillTaskRequest>) -> StatusCode {
            StatusCode::INTERNAL_SERVER_ERROR
        }

        let app = Router::new()
            .route("/rpc/call_task", post(call_task))
            .route("/rpc/kill_task", post(kill_task));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    fn call_request() -> WorkerCallTaskRequest {
        WorkerCallTaskRequest {
            name: "ping".to_string(),
            task_unique_id: "2024::1".to_string(),
            arguments: json!({}),
            timeout_ms: 1000,
            caller: "alice".to_string(),
            start_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_endpoint_normalization() {
        assert_eq!(
            HttpWorkerClient::endpoint("10.0.0.1:9000", "call_task"),
            "http://10.0.0.1:9000/rpc/call_task"
        );
        assert_eq!(
            HttpWorkerClient::endpoint("https://worker.local/", "kill_task"),
            "https://worker.local/rpc/kill_task"
        );
    }

    #[tokio::test]
    async fn test_call_task_sends_token_header() {
        let address = spawn_worker().await;
        let worker = WorkerInfo::new("w1", "builtin", address);
        let client = HttpWorkerClient::new(Duration::from_secs(5)).unwrap();

        let ack = client
            .call_task(&worker, "token-1", &call_request())
            .await
            .unwrap();
        assert!(ack.success);

        let ack = client
            .call_task(&worker, "other", &call_request())
            .await
            .unwrap();
        assert!(!ack.success);
    }

    #[tokio::test]
    async fn test_http_error_is_dispatch_failure() {
        let address = spawn_worker().await;
        let worker = WorkerInfo::new("w1", "builtin", address);
        let client = HttpWorkerClient::new(Duration::from_secs(5)).unwrap();

        let request = WorkerKillTaskRequest {
            task_unique_id: "2024::1".to_string(),
            timestamp: Utc::now(),
        };
        assert!(matches!(
            client.kill_task(&worker, &request).await,
            Err(TaskMeshError::DispatchFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_dispatch_failure() {
        let worker = WorkerInfo::new("w1", "builtin", "127.0.0.1:1");
        let client = HttpWorkerClient::new(Duration::from_millis(500)).unwrap();
        assert!(matches!(
            client.call_task(&worker, "t", &call_request()).await,
            Err(TaskMeshError::DispatchFailure(_))
        ));
    }
}
