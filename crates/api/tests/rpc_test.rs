#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use taskmesh_api::{create_app, TaskService};
    use taskmesh_core::models::{PartitionGranularity, NEXT_SRV_TOKEN_HEADER, SRV_TOKEN_HEADER};
    use taskmesh_dispatcher::{SrvTokenAuthority, TaskDispatcher, WorkerRegistry};
    use taskmesh_testing_utils::{
        task_definition, worker, MockAuthService, MockResultStore, MockScheduleRepository,
        MockTaskDefinitionRepository, MockTokenStore, MockWorkerClient, MockWorkerDiscovery,
    };
    use tower::ServiceExt;

    const ALICE: &str = "alice-key";

    struct Harness {
        app: Router,
        discovery: MockWorkerDiscovery,
        client: MockWorkerClient,
        results: MockResultStore,
    }

    fn harness() -> Harness {
        let discovery = MockWorkerDiscovery::with_workers(&[worker("w1", "builtin")]);
        let client = MockWorkerClient::new();
        let results = MockResultStore::new();
        let definitions =
            MockTaskDefinitionRepository::with_definitions(vec![task_definition("builtin.ping", false)]);

        let authority = Arc::new(SrvTokenAuthority::new(
            Arc::new(MockTokenStore::new()),
            Duration::from_secs(300),
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            Arc::new(WorkerRegistry::new(Arc::new(discovery.clone()))),
            authority.clone(),
            Arc::new(results.clone()),
            Arc::new(definitions.clone()),
            Arc::new(client.clone()),
            PartitionGranularity::Year,
        ));
        let service = Arc::new(TaskService::new(
            dispatcher,
            authority,
            Arc::new(results.clone()),
            Arc::new(definitions),
            Arc::new(MockScheduleRepository::new()),
            Arc::new(MockAuthService::new().with_user(ALICE, "alice")),
        ));

        Harness {
            app: create_app(service),
            discovery,
            client,
            results,
        }
    }

    fn rpc(method: &str, headers: &[(&str, &str)], body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/rpc/{method}"))
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call_ping(h: &Harness) -> (String, String) {
        let (status, body) = send(
            &h.app,
            rpc(
                "call_task",
                &[("authorization", ALICE)],
                json!({"codename": "builtin.ping", "arguments": {"n": 1}, "timeout_ms": 1000}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["task_unique_id"].as_str().unwrap().to_string();
        (id, h.client.last_call().unwrap().srv_token)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "taskmesh");
        assert_eq!(body["live_workers"], 1);
    }

    #[tokio::test]
    async fn test_health_degraded_when_discovery_fails() {
        let h = harness();
        h.discovery.set_failure(true);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert!(body["live_workers"].is_null());
    }

    #[tokio::test]
    async fn test_call_task_and_get_result() {
        let h = harness();
        let (id, _) = call_ping(&h).await;

        let (status, body) = send(
            &h.app,
            rpc("get_result", &[("authorization", ALICE)], json!({"task_unique_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "RUNNING");
        assert_eq!(body["caller"], "alice");
        assert_eq!(body["worker"], "w1");
    }

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let h = harness();
        let (status, body) = send(
            &h.app,
            rpc("call_task", &[], json!({"codename": "builtin.ping", "timeout_ms": 1000})),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTH_FAILURE");
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_worker_maps_to_service_unavailable() {
        let h = harness();
        h.discovery.clear();

        let (status, body) = send(
            &h.app,
            rpc(
                "call_task",
                &[("authorization", ALICE)],
                json!({"codename": "builtin.ping", "timeout_ms": 1000}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "NO_WORKER_AVAILABLE");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/rpc/call_task")
            .header(CONTENT_TYPE, "application/json")
            .header("authorization", ALICE)
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_status_callback_then_kill_of_finished_task() {
        let h = harness();
        let (id, token) = call_ping(&h).await;

        let (status, body) = send(
            &h.app,
            rpc(
                "set_result_status",
                &[(SRV_TOKEN_HEADER, token.as_str())],
                json!({"task_unique_id": id, "status": "SUCCESS"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["next_srv_token"].as_str().is_some_and(|t| t != token));

        let (status, body) = send(
            &h.app,
            rpc(
                "set_result_status",
                &[(SRV_TOKEN_HEADER, token.as_str())],
                json!({"task_unique_id": id, "status": "FAILURE"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTH_FAILURE");

        let (status, body) = send(
            &h.app,
            rpc("kill_task", &[("authorization", ALICE)], json!({"task_unique_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(h.client.kills().is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_callback_returns_next_token_header() {
        let h = harness();
        let (id, token) = call_ping(&h).await;
        h.results.set_status_write_failure(true);

        let response = h
            .app
            .clone()
            .oneshot(rpc(
                "set_result_status",
                &[(SRV_TOKEN_HEADER, token.as_str())],
                json!({"task_unique_id": id, "status": "SUCCESS"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let retry_token = response
            .headers()
            .get(NEXT_SRV_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert_ne!(retry_token, token);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "STORAGE_FAILURE");

        h.results.set_status_write_failure(false);
        let (status, _) = send(
            &h.app,
            rpc(
                "set_result_status",
                &[(SRV_TOKEN_HEADER, retry_token.as_str())],
                json!({"task_unique_id": id, "status": "SUCCESS"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_is_valid_srv_token() {
        let h = harness();
        let (_, token) = call_ping(&h).await;

        let (status, body) = send(
            &h.app,
            rpc("is_valid_srv_token", &[(SRV_TOKEN_HEADER, token.as_str())], json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (_, body) = send(&h.app, rpc("is_valid_srv_token", &[], json!({}))).await;
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn test_append_task_log_streams_acks() {
        let h = harness();
        let (id, token) = call_ping(&h).await;

        let body = format!(
            "{}\n{}\n",
            json!({"task_unique_id": id, "content": "one"}),
            json!({"task_unique_id": id, "content": "two"}),
        );
        let request = Request::builder()
            .method("POST")
            .uri("/rpc/append_task_log")
            .header(CONTENT_TYPE, "application/x-ndjson")
            .header(SRV_TOKEN_HEADER, token.as_str())
            .body(Body::from(body))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let next = response
            .headers()
            .get(NEXT_SRV_TOKEN_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_ne!(next, token);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let acks: Vec<Value> = std::str::from_utf8(&bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(acks, vec![json!({"seq": 1}), json!({"seq": 2})]);
    }

    #[tokio::test]
    async fn test_append_task_log_with_bad_token() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/rpc/append_task_log")
            .header(SRV_TOKEN_HEADER, "forged")
            .body(Body::from("{}\n"))
            .unwrap();
        let (status, body) = send(&h.app, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "AUTH_FAILURE");
    }
}
