#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use futures::stream::{self, StreamExt};
    use serde_json::json;
    use taskmesh_api::*;
    use taskmesh_core::models::*;
    use taskmesh_core::traits::{Permission, TaskCaller};
    use taskmesh_core::TaskMeshError;
    use taskmesh_dispatcher::{SrvTokenAuthority, TaskDispatcher, WorkerRegistry};
    use taskmesh_testing_utils::{
        task_definition, worker, MockAuthService, MockResultStore, MockScheduleRepository,
        MockTaskDefinitionRepository, MockTokenStore, MockWorkerClient, MockWorkerDiscovery,
        ScheduleBuilder,
    };

    const ALICE: &str = "alice-key";

    struct Fixture {
        results: MockResultStore,
        tokens: MockTokenStore,
        client: MockWorkerClient,
        auth: MockAuthService,
        service: Arc<TaskService>,
    }

    fn fixture() -> Fixture {
        let discovery = MockWorkerDiscovery::with_workers(&[worker("w1", "builtin")]);
        let tokens = MockTokenStore::new();
        let results = MockResultStore::new();
        let definitions = MockTaskDefinitionRepository::with_definitions(vec![
            task_definition("builtin.ping", false),
            task_definition("etl.load", true),
        ]);
        let schedules = MockScheduleRepository::with_schedules(vec![ScheduleBuilder::new()
            .with_codename("builtin.ping")
            .build()]);
        let client = MockWorkerClient::new();
        let auth = MockAuthService::new().with_user(ALICE, "alice");

        let authority = Arc::new(SrvTokenAuthority::new(
            Arc::new(tokens.clone()),
            Duration::from_secs(300),
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            Arc::new(WorkerRegistry::new(Arc::new(discovery))),
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
            Arc::new(schedules),
            Arc::new(auth.clone()),
        ));

        Fixture {
            results,
            tokens,
            client,
            auth,
            service,
        }
    }

    fn ping() -> CallTaskRequest {
        CallTaskRequest {
            codename: "builtin.ping".to_string(),
            arguments: json!({"n": 1}),
            timeout_ms: 5000,
        }
    }

    fn line(task_unique_id: &str, content: &str) -> LogLine {
        LogLine {
            task_unique_id: task_unique_id.to_string(),
            content: content.to_string(),
        }
    }

    /// 派发一个任务，返回任务ID和派发时签发给Worker的令牌
    async fn dispatch(f: &Fixture) -> (String, String) {
        let id = f.service.call_task(ALICE, ping()).await.unwrap();
        let token = f.client.last_call().unwrap().srv_token;
        (id, token)
    }

    fn stored(f: &Fixture, raw: &str) -> TaskResult {
        let id = TaskUniqueId::decode(raw).unwrap();
        f.results
            .all_results(id.partition_label())
            .into_iter()
            .find(|r| r.id == id.result_id())
            .unwrap()
    }

    #[tokio::test]
    async fn test_call_task_uses_authenticated_user_as_caller() {
        let f = fixture();
        let (id, _) = dispatch(&f).await;

        let result = f.service.get_result(ALICE, &id).await.unwrap();
        assert_eq!(result.caller, "alice");
        assert_eq!(result.status, ResultStatus::Running);
    }

    #[tokio::test]
    async fn test_unauthenticated_and_forbidden_calls_create_nothing() {
        let f = fixture();
        let label = PartitionGranularity::Year.label_for(Utc::now());

        assert!(matches!(
            f.service.call_task("nobody", ping()).await,
            Err(TaskMeshError::Auth(_))
        ));

        f.auth.deny("alice", Permission::CallTask);
        assert!(matches!(
            f.service.call_task(ALICE, ping()).await,
            Err(TaskMeshError::Forbidden(_))
        ));
        assert!(f.results.all_results(&label).is_empty());
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_callbacks_rotate_tokens() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;

        let receipt = f
            .service
            .set_result_status(&token, &id, ResultStatus::Running)
            .await
            .unwrap();
        assert_ne!(receipt.next_srv_token, token);

        // 旧令牌已被核销
        assert!(matches!(
            f.service
                .set_result_status(&token, &id, ResultStatus::Success)
                .await,
            Err(CallbackError {
                error: TaskMeshError::Auth(_),
                next_srv_token: None,
            })
        ));

        let receipt = f
            .service
            .set_result_status(&receipt.next_srv_token, &id, ResultStatus::Success)
            .await
            .unwrap();
        let result = stored(&f, &id);
        assert_eq!(result.status, ResultStatus::Success);
        assert!(result.end_at.is_some());

        // 终态不可再变更，但仍换发新令牌
        let rejected = f
            .service
            .set_result_status(&receipt.next_srv_token, &id, ResultStatus::Failure)
            .await
            .unwrap_err();
        assert!(matches!(rejected.error, TaskMeshError::InvalidTransition { .. }));
        assert!(rejected.next_srv_token.is_some());
        assert_eq!(stored(&f, &id).status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn test_initialization_is_never_a_target() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;

        let rejected = f
            .service
            .set_result_status(&token, &id, ResultStatus::Initialization)
            .await
            .unwrap_err();
        assert!(matches!(rejected.error, TaskMeshError::InvalidTransition { .. }));
        assert_eq!(stored(&f, &id).status, ResultStatus::Running);
    }

    #[tokio::test]
    async fn test_status_callback_can_be_retried_after_storage_failure() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;

        f.results.set_status_write_failure(true);
        let rejected = f
            .service
            .set_result_status(&token, &id, ResultStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(rejected.error, TaskMeshError::Storage(_)));
        let retry_token = rejected.next_srv_token.unwrap();
        assert_eq!(f.tokens.len(), 1);
        assert_eq!(stored(&f, &id).status, ResultStatus::Running);

        f.results.set_status_write_failure(false);
        let receipt = f
            .service
            .set_result_status(&retry_token, &id, ResultStatus::Success)
            .await
            .unwrap();
        assert_ne!(receipt.next_srv_token, retry_token);
        assert_eq!(stored(&f, &id).status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn test_token_is_scoped_to_its_task() {
        let f = fixture();
        let (first, first_token) = dispatch(&f).await;
        let (second, _) = dispatch(&f).await;
        assert_ne!(first, second);

        assert!(matches!(
            f.service
                .set_result_status(&first_token, &second, ResultStatus::Success)
                .await,
            Err(CallbackError {
                error: TaskMeshError::Auth(_),
                next_srv_token: None,
            })
        ));
        assert_eq!(stored(&f, &second).status, ResultStatus::Running);
        assert_eq!(stored(&f, &first).status, ResultStatus::Running);
    }

    #[tokio::test]
    async fn test_append_task_log_acks_each_line() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;

        let lines = vec![line(&id, "starting"), line(&id, "working"), line(&id, "done")];
        let (next, acks) = f
            .service
            .append_task_log(&token, stream::iter(lines.into_iter().map(Ok)))
            .await
            .unwrap();
        let seqs: Vec<u64> = acks.map(|ack| ack.unwrap().seq).collect().await;
        assert_eq!(seqs, vec![1, 2, 3]);

        let parsed = TaskUniqueId::decode(&id).unwrap();
        let logs = f.results.all_logs(parsed.partition_label());
        let contents: Vec<&str> = logs.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["starting", "working", "done"]);
        assert!(logs.iter().all(|l| l.result_id == parsed.result_id()));

        let check = f.service.is_valid_srv_token(&next).await.unwrap();
        assert!(check.valid);
    }

    #[tokio::test]
    async fn test_foreign_log_line_ends_stream() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;
        let (other, _) = dispatch(&f).await;

        let lines = vec![line(&id, "a"), line(&other, "b"), line(&id, "c")];
        let (_, acks) = f
            .service
            .append_task_log(&token, stream::iter(lines.into_iter().map(Ok)))
            .await
            .unwrap();
        let acks: Vec<_> = acks.collect().await;

        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].as_ref().unwrap().seq, 1);
        assert!(matches!(acks[1], Err(TaskMeshError::Auth(_))));
        let label = TaskUniqueId::decode(&id).unwrap();
        assert_eq!(f.results.all_logs(label.partition_label()).len(), 1);
    }

    #[tokio::test]
    async fn test_log_storage_failure_ends_stream() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;
        f.results.fail_logs_after(1);

        let lines = vec![line(&id, "a"), line(&id, "b"), line(&id, "c")];
        let (_, acks) = f
            .service
            .append_task_log(&token, stream::iter(lines.into_iter().map(Ok)))
            .await
            .unwrap();
        let acks: Vec<_> = acks.collect().await;

        assert_eq!(acks.len(), 2);
        assert!(acks[0].is_ok());
        assert!(matches!(acks[1], Err(TaskMeshError::Storage(_))));
    }

    #[tokio::test]
    async fn test_append_with_invalid_token_is_rejected() {
        let f = fixture();
        let (id, _) = dispatch(&f).await;

        let result = f
            .service
            .append_task_log("forged", stream::iter(vec![Ok(line(&id, "a"))]))
            .await;
        assert!(matches!(result, Err(TaskMeshError::Auth(_))));
    }

    #[tokio::test]
    async fn test_is_valid_srv_token_consumes_and_rotates() {
        let f = fixture();
        let (_, token) = dispatch(&f).await;

        let check = f.service.is_valid_srv_token(&token).await.unwrap();
        assert!(check.valid);
        let next = check.next_srv_token.unwrap();

        let again = f.service.is_valid_srv_token(&token).await.unwrap();
        assert_eq!(
            again,
            SrvTokenCheck {
                valid: false,
                next_srv_token: None
            }
        );
        assert!(f.service.is_valid_srv_token(&next).await.unwrap().valid);
        assert_eq!(f.tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_entry_bypasses_user_auth() {
        let f = fixture();

        let id = TaskCaller::call_task(
            f.service.as_ref(),
            "builtin.ping",
            json!({}),
            "scheduler",
            1000,
        )
        .await
        .unwrap();
        assert_eq!(stored(&f, &id).caller, "scheduler");
    }

    #[tokio::test]
    async fn test_kill_task_forwards_to_dispatcher() {
        let f = fixture();
        let (id, _) = dispatch(&f).await;

        f.service.kill_task(ALICE, &id).await.unwrap();
        assert_eq!(f.client.kills().len(), 1);

        f.auth.deny("alice", Permission::KillTask);
        assert!(matches!(
            f.service.kill_task(ALICE, &id).await,
            Err(TaskMeshError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_queries() {
        let f = fixture();
        let (id, token) = dispatch(&f).await;
        let (_, acks) = f
            .service
            .append_task_log(&token, stream::iter(vec![Ok(line(&id, "hello"))]))
            .await
            .unwrap();
        let _: Vec<_> = acks.collect().await;

        let label = TaskUniqueId::decode(&id).unwrap().partition_label().to_string();
        let results = f
            .service
            .paged_list_results(
                ALICE,
                &label,
                &ResultFilter {
                    caller: Some("alice".to_string()),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(results.total, 1);

        let logs = f
            .service
            .list_task_logs(ALICE, &id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(logs.items[0].content, "hello");

        let tasks = f
            .service
            .paged_list_tasks(
                ALICE,
                &TaskDefinitionFilter {
                    disabled: Some(false),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(tasks.items.len(), 1);
        assert_eq!(tasks.items[0].codename, "builtin.ping");

        let schedules = f
            .service
            .paged_list_schedules(ALICE, &ScheduleFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(schedules.total, 1);

        let workers = f.service.list_workers(ALICE).await.unwrap();
        assert_eq!(workers[0].worker_id, "w1");

        f.auth.deny("alice", Permission::ListWorkers);
        assert!(matches!(
            f.service.list_workers(ALICE).await,
            Err(TaskMeshError::Forbidden(_))
        ));

        assert!(matches!(
            f.service.get_result(ALICE, &format!("{label}::999")).await,
            Err(TaskMeshError::NotFound(_))
        ));
    }
}
