#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use taskmesh_core::models::*;
    use taskmesh_core::TaskMeshError;
    use taskmesh_dispatcher::*;
    use taskmesh_testing_utils::{
        task_definition, worker, MockResultStore, MockTaskDefinitionRepository,
        MockTokenStore, MockWorkerClient, MockWorkerDiscovery, TaskResultBuilder,
        WorkerBehavior,
    };

    struct Fixture {
        discovery: MockWorkerDiscovery,
        tokens: MockTokenStore,
        results: MockResultStore,
        definitions: MockTaskDefinitionRepository,
        client: MockWorkerClient,
        dispatcher: TaskDispatcher,
    }

    fn fixture(workers: &[WorkerInfo]) -> Fixture {
        let discovery = MockWorkerDiscovery::with_workers(workers);
        let tokens = MockTokenStore::new();
        let results = MockResultStore::new();
        let definitions = MockTaskDefinitionRepository::new();
        let client = MockWorkerClient::new();

        let dispatcher = TaskDispatcher::new(
            Arc::new(WorkerRegistry::new(Arc::new(discovery.clone()))),
            Arc::new(SrvTokenAuthority::new(
                Arc::new(tokens.clone()),
                Duration::from_secs(300),
            )),
            Arc::new(results.clone()),
            Arc::new(definitions.clone()),
            Arc::new(client.clone()),
            PartitionGranularity::Year,
        );

        Fixture {
            discovery,
            tokens,
            results,
            definitions,
            client,
            dispatcher,
        }
    }

    fn current_label() -> String {
        PartitionGranularity::Year.label_for(Utc::now())
    }

    fn stored(f: &Fixture, id: &TaskUniqueId) -> TaskResult {
        f.results
            .all_results(id.partition_label())
            .into_iter()
            .find(|r| r.id == id.result_id())
            .expect("result row")
    }

    #[tokio::test]
    async fn test_call_task_dispatches_to_live_worker() {
        let f = fixture(&[worker("w1", "builtin")]);

        let dispatched = f
            .dispatcher
            .call_task("builtin.ping", json!({"n": 1}), "alice", 5000)
            .await
            .unwrap();
        let id = TaskUniqueId::decode(&dispatched.encode()).unwrap();
        assert_eq!(id.partition_label(), current_label());
        assert_eq!(id.result_id(), 1);

        let result = stored(&f, &id);
        assert_eq!(result.task_codename, "builtin.ping");
        assert_eq!(result.caller, "alice");
        assert_eq!(result.worker.as_deref(), Some("w1"));
        assert_eq!(result.status, ResultStatus::Running);
        assert_eq!(result.arguments, json!({"n": 1}));
        assert!(result.end_at.is_none());

        let call = f.client.last_call().unwrap();
        assert_eq!(call.worker.worker_id, "w1");
        assert_eq!(call.request.name, "ping");
        assert_eq!(call.request.task_unique_id, id.encode());
        assert_eq!(call.request.caller, "alice");
        assert_eq!(call.request.timeout_ms, 5000);

        // 令牌绑定到 {Worker地址, 任务ID}
        let binding: SrvTokenBinding =
            serde_json::from_str(&f.tokens.binding_of(&call.srv_token).unwrap()).unwrap();
        assert_eq!(
            binding,
            SrvTokenBinding::new("w1.local:9000", id.encode())
        );
    }

    #[tokio::test]
    async fn test_malformed_codename_persists_call_error() {
        let f = fixture(&[worker("w1", "builtin")]);

        let err = f
            .dispatcher
            .call_task("nomodule", json!({}), "alice", 5000)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskMeshError::Validation(_)));
        assert!(f.client.calls().is_empty());

        let rows = f.results.all_results(&current_label());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ResultStatus::CallError);
        assert!(rows[0].end_at.is_some());
    }

    #[tokio::test]
    async fn test_disabled_definition_is_not_dispatched() {
        let f = fixture(&[worker("w1", "builtin")]);
        f.definitions.add(task_definition("builtin.ping", true));

        let err = f
            .dispatcher
            .call_task("builtin.ping", json!({}), "alice", 5000)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskMeshError::Validation(_)));
        assert!(f.client.calls().is_empty());
        assert_eq!(
            f.results.all_results(&current_label())[0].status,
            ResultStatus::CallError
        );
    }

    #[tokio::test]
    async fn test_enabled_definition_is_dispatched() {
        let f = fixture(&[worker("w1", "builtin")]);
        f.definitions.add(task_definition("builtin.ping", false));

        f.dispatcher
            .call_task("builtin.ping", json!({}), "alice", 5000)
            .await
            .unwrap();
        assert_eq!(f.client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_no_worker_for_modular() {
        let f = fixture(&[worker("w1", "etl")]);

        let err = f
            .dispatcher
            .call_task("builtin.ping", json!({}), "alice", 5000)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskMeshError::NoWorkerAvailable(_)));
        assert!(f.client.calls().is_empty());
        assert_eq!(
            f.results.all_results(&current_label())[0].status,
            ResultStatus::NoWorkerError
        );
    }

    #[tokio::test]
    async fn test_rejected_and_unreachable_workers_persist_call_error() {
        for behavior in [
            WorkerBehavior::Reject("busy".to_string()),
            WorkerBehavior::Unreachable,
        ] {
            let f = fixture(&[worker("w1", "builtin")]);
            f.client.set_behavior(behavior.clone());

            let err = f
                .dispatcher
                .call_task("builtin.ping", json!({}), "alice", 5000)
                .await
                .unwrap_err();
            assert!(
                matches!(err, TaskMeshError::DispatchFailure(_)),
                "{behavior:?}: {err:?}"
            );

            let rows = f.results.all_results(&current_label());
            assert_eq!(rows[0].status, ResultStatus::CallError, "{behavior:?}");
            assert!(rows[0].worker.is_none());
        }
    }

    #[tokio::test]
    async fn test_failure_state_write_error_is_returned() {
        let f = fixture(&[]);
        f.results.set_status_write_failure(true);

        let err = f
            .dispatcher
            .call_task("builtin.ping", json!({}), "alice", 5000)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskMeshError::Storage(_)));
    }

    #[tokio::test]
    async fn test_worker_is_chosen_among_matching_modular() {
        let f = fixture(&[
            worker("w1", "builtin"),
            worker("w2", "etl"),
            worker("w3", "builtin"),
        ]);

        for _ in 0..30 {
            f.dispatcher
                .call_task("builtin.ping", json!({}), "alice", 5000)
                .await
                .unwrap();
        }
        let chosen: HashSet<String> = f
            .client
            .calls()
            .into_iter()
            .map(|c| c.worker.worker_id)
            .collect();
        assert!(!chosen.contains("w2"));
        assert!(chosen.iter().all(|id| id == "w1" || id == "w3"));
    }

    #[tokio::test]
    async fn test_every_outcome_leaves_documented_state() {
        let f = fixture(&[worker("w1", "builtin")]);

        for codename in ["builtin.ping", "nomodule", "etl.load", "builtin.echo"] {
            let outcome = f
                .dispatcher
                .call_task(codename, json!({}), "alice", 5000)
                .await;
            match outcome {
                Ok(id) => {
                    let result = stored(&f, &id);
                    assert!(matches!(
                        result.status,
                        ResultStatus::Initialization | ResultStatus::Running
                    ));
                    assert!(result.worker.is_some());
                }
                Err(_) => {
                    let rows = f.results.all_results(&current_label());
                    let last = rows.last().unwrap();
                    assert!(last.status.is_terminal(), "{codename}: {:?}", last.status);
                }
            }
        }
    }

    fn seed_running(f: &Fixture, worker_id: &str) -> TaskUniqueId {
        let label = current_label();
        let row = f
            .results
            .seed_result(&label, TaskResultBuilder::new().running_on(worker_id).build());
        TaskUniqueId::new(label, row.id).unwrap()
    }

    #[tokio::test]
    async fn test_kill_running_task_signals_worker() {
        let f = fixture(&[worker("w1", "builtin")]);
        let id = seed_running(&f, "w1");

        f.dispatcher.kill_task(&id.encode()).await.unwrap();

        let kills = f.client.kills();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].worker.worker_id, "w1");
        assert_eq!(kills[0].request.task_unique_id, id.encode());
        // 最终状态由Worker回调决定
        assert_eq!(stored(&f, &id).status, ResultStatus::Running);
    }

    #[tokio::test]
    async fn test_kill_terminal_task_is_rejected() {
        let f = fixture(&[worker("w1", "builtin")]);
        let label = current_label();
        let row = f.results.seed_result(
            &label,
            TaskResultBuilder::new()
                .with_worker("w1")
                .with_status(ResultStatus::Success)
                .build(),
        );
        let id = TaskUniqueId::new(label, row.id).unwrap();

        let err = f.dispatcher.kill_task(&id.encode()).await.unwrap_err();
        match err {
            TaskMeshError::Validation(message) => assert_eq!(message, NOT_RUNNING_MESSAGE),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(f.client.kills().is_empty());
        assert_eq!(stored(&f, &id).status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn test_kill_malformed_and_missing_ids() {
        let f = fixture(&[worker("w1", "builtin")]);

        for raw in ["", "2024", "2024::1::2", "2024::abc"] {
            assert!(matches!(
                f.dispatcher.kill_task(raw).await,
                Err(TaskMeshError::Validation(_))
            ));
        }
        assert!(matches!(
            f.dispatcher.kill_task("1999::42").await,
            Err(TaskMeshError::NotFound(_))
        ));
        assert!(f.client.kills().is_empty());
    }

    #[tokio::test]
    async fn test_kill_with_vanished_worker_persists_no_worker_error() {
        let f = fixture(&[worker("w1", "builtin")]);
        let id = seed_running(&f, "w1");
        f.discovery.remove_worker("w1");

        let err = f.dispatcher.kill_task(&id.encode()).await.unwrap_err();
        assert!(matches!(err, TaskMeshError::NoWorkerAvailable(_)));
        assert_eq!(stored(&f, &id).status, ResultStatus::NoWorkerError);
    }

    #[tokio::test]
    async fn test_kill_keeps_terminal_status_reported_mid_flight() {
        let f = fixture(&[worker("w1", "builtin")]);
        let id = seed_running(&f, "w1");
        f.discovery.remove_worker("w1");
        // Worker在kill读取状态之后回报成功
        f.results
            .land_status_after_read(id.partition_label(), id.result_id(), ResultStatus::Success);

        let err = f.dispatcher.kill_task(&id.encode()).await.unwrap_err();
        assert!(matches!(err, TaskMeshError::InvalidTransition { .. }));
        let row = stored(&f, &id);
        assert_eq!(row.status, ResultStatus::Success);
        assert!(row.end_at.is_some());
        assert!(f.client.kills().is_empty());
    }

    #[tokio::test]
    async fn test_kill_rpc_failure_keeps_status() {
        let f = fixture(&[worker("w1", "builtin")]);
        let id = seed_running(&f, "w1");
        f.client.set_behavior(WorkerBehavior::Unreachable);

        let err = f.dispatcher.kill_task(&id.encode()).await.unwrap_err();
        assert!(matches!(err, TaskMeshError::DispatchFailure(_)));
        assert_eq!(stored(&f, &id).status, ResultStatus::Running);
    }
}
