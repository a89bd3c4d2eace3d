//! In-memory implementations of the port traits
//!
//! Every mock is cheaply cloneable and shares its state between clones, so a
//! test can hand one clone to the component under test and inspect the other.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use taskmesh_core::{
    models::{
        NewTaskResult, PageRequest, Paged, Partition, ResultFilter, ResultStatus,
        ScheduleDefinition, ScheduleFilter, TaskDefinition, TaskDefinitionFilter, TaskLog,
        TaskResult, WorkerAck, WorkerCallTaskRequest, WorkerInfo, WorkerKillTaskRequest,
    },
    traits::{
        AcquireOutcome, AuthService, DiscoveryEntry, DistributedLock, Identity, Permission,
        ResultStore, ScheduleRepository, TaskCaller, TaskDefinitionRepository, TokenStore,
        WorkerClient, WorkerDiscovery,
    },
    Result, TaskMeshError,
};

pub const MOCK_WORKER_PREFIX: &str = "taskmesh/workers/";

fn page_of<T: Clone>(items: Vec<T>, page: PageRequest) -> Paged<T> {
    let total = items.len() as i64;
    let slice = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Paged::new(slice, page, total)
}

/// Mock implementation of WorkerDiscovery backed by a list of raw entries
#[derive(Debug, Clone, Default)]
pub struct MockWorkerDiscovery {
    entries: Arc<Mutex<Vec<DiscoveryEntry>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockWorkerDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: &[WorkerInfo]) -> Self {
        let discovery = Self::new();
        for worker in workers {
            discovery.add_worker(worker);
        }
        discovery
    }

    pub fn add_worker(&self, worker: &WorkerInfo) {
        let value = serde_json::to_vec(worker).expect("WorkerInfo serializes");
        self.add_raw(format!("{MOCK_WORKER_PREFIX}{}", worker.worker_id), value);
    }

    pub fn add_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.lock().unwrap().push(DiscoveryEntry {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn remove_worker(&self, worker_id: &str) {
        let key = format!("{MOCK_WORKER_PREFIX}{worker_id}");
        self.entries.lock().unwrap().retain(|e| e.key != key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn set_failure(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl WorkerDiscovery for MockWorkerDiscovery {
    async fn list_entries(&self) -> Result<Vec<DiscoveryEntry>> {
        if *self.fail.lock().unwrap() {
            return Err(TaskMeshError::Coordination("discovery unavailable".to_string()));
        }
        Ok(self.entries.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone)]
struct LockEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory DistributedLock with real TTL expiry
#[derive(Debug, Clone, Default)]
pub struct InMemoryLock {
    entries: Arc<Mutex<HashMap<String, LockEntry>>>,
    fail_renewals: Arc<Mutex<bool>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the key as if its TTL ran out
    pub fn expire(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Make every renewal return a coordination error
    pub fn set_renew_failure(&self, fail: bool) {
        *self.fail_renewals.lock().unwrap() = fail;
    }

    pub fn holder(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<AcquireOutcome> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get(key) {
            Some(existing) if existing.expires_at > now => Ok(AcquireOutcome::Held {
                holder: Some(existing.value.clone()),
            }),
            _ => {
                entries.insert(
                    key.to_string(),
                    LockEntry {
                        value: value.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(AcquireOutcome::Acquired {
                    token: value.to_string(),
                })
            }
        }
    }

    async fn renew(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        if *self.fail_renewals.lock().unwrap() {
            return Err(TaskMeshError::Coordination("lock backend unavailable".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.value == token && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if entries.get(key).is_some_and(|e| e.value == token) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn current_holder(&self, key: &str) -> Result<Option<String>> {
        Ok(self.holder(key))
    }
}

/// In-memory TokenStore with TTL expiry
#[derive(Debug, Clone, Default)]
pub struct MockTokenStore {
    tokens: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MockTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn binding_of(&self, token: &str) -> Option<String> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .map(|(binding, _)| binding.clone())
    }
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn put(&self, token: &str, binding: &str, ttl: Duration) -> Result<()> {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), (binding.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<String>> {
        let entry = self.tokens.lock().unwrap().remove(token);
        Ok(entry
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(binding, _)| binding))
    }
}

#[derive(Debug, Default)]
struct ResultStoreState {
    partitions: Vec<Partition>,
    results: HashMap<String, Vec<TaskResult>>,
    logs: HashMap<String, Vec<TaskLog>>,
    next_log_id: i64,
}

/// In-memory ResultStore that mirrors the SQL stores' semantics
#[derive(Debug, Clone, Default)]
pub struct MockResultStore {
    state: Arc<Mutex<ResultStoreState>>,
    fail_status_writes: Arc<Mutex<bool>>,
    fail_logs_after: Arc<Mutex<Option<usize>>>,
    land_after_read: Arc<Mutex<Option<(String, i64, ResultStatus)>>>,
}

impl MockResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set_result_status` fail with a storage error
    pub fn set_status_write_failure(&self, fail: bool) {
        *self.fail_status_writes.lock().unwrap() = fail;
    }

    /// Apply `status` to the row right after the next `get_result` on it returns,
    /// as if a worker callback landed between a reader's check and its write
    pub fn land_status_after_read(&self, label: &str, result_id: i64, status: ResultStatus) {
        *self.land_after_read.lock().unwrap() = Some((label.to_string(), result_id, status));
    }

    /// Let `n` more log writes succeed, then fail every following one
    pub fn fail_logs_after(&self, n: usize) {
        *self.fail_logs_after.lock().unwrap() = Some(n);
    }

    pub fn all_results(&self, label: &str) -> Vec<TaskResult> {
        self.state
            .lock()
            .unwrap()
            .results
            .get(label)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_logs(&self, label: &str) -> Vec<TaskLog> {
        self.state
            .lock()
            .unwrap()
            .logs
            .get(label)
            .cloned()
            .unwrap_or_default()
    }

    /// Insert a result directly, bypassing the dispatcher
    pub fn seed_result(&self, label: &str, mut result: TaskResult) -> TaskResult {
        let mut state = self.state.lock().unwrap();
        Self::ensure_locked(&mut state, label);
        let rows = state.results.entry(label.to_string()).or_default();
        result.id = rows.len() as i64 + 1;
        rows.push(result.clone());
        result
    }

    fn ensure_locked(state: &mut ResultStoreState, label: &str) -> Partition {
        if let Some(p) = state.partitions.iter().find(|p| p.partition_label == label) {
            return p.clone();
        }
        let partition = Partition {
            id: state.partitions.len() as i64 + 1,
            partition_label: label.to_string(),
        };
        state.partitions.push(partition.clone());
        state.results.entry(label.to_string()).or_default();
        state.logs.entry(label.to_string()).or_default();
        partition
    }

    fn missing_table(label: &str) -> TaskMeshError {
        TaskMeshError::Storage(format!("no such partition: {label}"))
    }

    fn with_result<T>(
        &self,
        label: &str,
        result_id: i64,
        f: impl FnOnce(&mut TaskResult) -> T,
    ) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let rows = state
            .results
            .get_mut(label)
            .ok_or_else(|| Self::missing_table(label))?;
        let row = rows
            .iter_mut()
            .find(|r| r.id == result_id)
            .ok_or_else(|| TaskMeshError::NotFound(format!("result {label}::{result_id}")))?;
        Ok(f(row))
    }
}

#[async_trait]
impl ResultStore for MockResultStore {
    async fn create_partition(&self, label: &str) -> Result<Partition> {
        Partition::validate_label(label)?;
        let mut state = self.state.lock().unwrap();
        if state.partitions.iter().any(|p| p.partition_label == label) {
            return Err(TaskMeshError::Validation(format!(
                "partition already exists: {label}"
            )));
        }
        Ok(Self::ensure_locked(&mut state, label))
    }

    async fn ensure_partition(&self, label: &str) -> Result<Partition> {
        Partition::validate_label(label)?;
        let mut state = self.state.lock().unwrap();
        Ok(Self::ensure_locked(&mut state, label))
    }

    async fn get_partition(&self, label: &str) -> Result<Option<Partition>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .partitions
            .iter()
            .find(|p| p.partition_label == label)
            .cloned())
    }

    async fn resolve_partition_label(&self, partition_id: i64) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .partitions
            .iter()
            .find(|p| p.id == partition_id)
            .map(|p| p.partition_label.clone())
            .ok_or_else(|| TaskMeshError::NotFound(format!("partition {partition_id}")))
    }

    async fn list_partitions(&self) -> Result<Vec<Partition>> {
        Ok(self.state.lock().unwrap().partitions.clone())
    }

    async fn new_result(&self, label: &str, result: &NewTaskResult) -> Result<TaskResult> {
        let mut state = self.state.lock().unwrap();
        let rows = state
            .results
            .get_mut(label)
            .ok_or_else(|| Self::missing_table(label))?;
        let created = TaskResult {
            id: rows.len() as i64 + 1,
            task_codename: result.task_codename.clone(),
            status: ResultStatus::Initialization,
            caller: result.caller.clone(),
            worker: None,
            timeout_ms: result.timeout_ms,
            arguments: result.arguments.clone(),
            start_at: result.start_at,
            end_at: None,
        };
        rows.push(created.clone());
        Ok(created)
    }

    async fn get_result(&self, label: &str, result_id: i64) -> Result<Option<TaskResult>> {
        let mut state = self.state.lock().unwrap();
        let rows = state.results.get_mut(label);
        let Some(row) = rows.and_then(|rows| rows.iter_mut().find(|r| r.id == result_id)) else {
            return Ok(None);
        };
        let read = row.clone();

        let mut pending = self.land_after_read.lock().unwrap();
        let lands = matches!(
            pending.as_ref(),
            Some((l, id, _)) if l.as_str() == label && *id == result_id
        );
        if lands {
            if let Some((_, _, status)) = pending.take() {
                row.status = status;
                if status.is_terminal() {
                    row.end_at = Some(Utc::now());
                }
            }
        }
        Ok(Some(read))
    }

    async fn set_result_status(
        &self,
        label: &str,
        result_id: i64,
        status: ResultStatus,
    ) -> Result<()> {
        if *self.fail_status_writes.lock().unwrap() {
            return Err(TaskMeshError::Storage("status write failed".to_string()));
        }
        self.with_result(label, result_id, |row| {
            if row.status.is_terminal() {
                return Err(TaskMeshError::InvalidTransition {
                    from: format!("{:?}", row.status),
                    to: format!("{status:?}"),
                });
            }
            row.status = status;
            if status.is_terminal() {
                row.end_at = Some(Utc::now());
            }
            Ok(())
        })?
    }

    async fn set_result_worker(&self, label: &str, result_id: i64, worker_id: &str) -> Result<()> {
        self.with_result(label, result_id, |row| {
            row.worker = Some(worker_id.to_string());
        })
    }

    async fn mark_dispatched(&self, label: &str, result_id: i64, worker_id: &str) -> Result<()> {
        self.with_result(label, result_id, |row| {
            row.worker = Some(worker_id.to_string());
            if row.status == ResultStatus::Initialization {
                row.status = ResultStatus::Running;
            }
        })
    }

    async fn paged_list_results(
        &self,
        label: &str,
        filter: &ResultFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskResult>> {
        let mut rows: Vec<TaskResult> = self
            .all_results(label)
            .into_iter()
            .filter(|r| {
                filter
                    .task_codename
                    .as_ref()
                    .is_none_or(|c| &r.task_codename == c)
                    && filter.status.is_none_or(|s| r.status == s)
                    && filter.caller.as_ref().is_none_or(|c| &r.caller == c)
            })
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(page_of(rows, page))
    }

    async fn new_log(&self, label: &str, result_id: i64, content: &str) -> Result<TaskLog> {
        {
            let mut budget = self.fail_logs_after.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(TaskMeshError::Storage("log write failed".to_string()));
                }
                *remaining -= 1;
            }
        }
        let mut state = self.state.lock().unwrap();
        state.next_log_id += 1;
        let id = state.next_log_id;
        let logs = state
            .logs
            .get_mut(label)
            .ok_or_else(|| Self::missing_table(label))?;
        let log = TaskLog {
            id,
            result_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        logs.push(log.clone());
        Ok(log)
    }

    async fn list_logs(
        &self,
        label: &str,
        result_id: i64,
        page: PageRequest,
    ) -> Result<Paged<TaskLog>> {
        let logs = self
            .all_logs(label)
            .into_iter()
            .filter(|l| l.result_id == result_id)
            .collect();
        Ok(page_of(logs, page))
    }
}

/// How the mock worker answers RPCs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerBehavior {
    Ack,
    Reject(String),
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub worker: WorkerInfo,
    pub srv_token: String,
    pub request: WorkerCallTaskRequest,
}

#[derive(Debug, Clone)]
pub struct RecordedKill {
    pub worker: WorkerInfo,
    pub request: WorkerKillTaskRequest,
}

/// Recording WorkerClient with configurable answers
#[derive(Debug, Clone)]
pub struct MockWorkerClient {
    behavior: Arc<Mutex<WorkerBehavior>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    kills: Arc<Mutex<Vec<RecordedKill>>>,
}

impl Default for MockWorkerClient {
    fn default() -> Self {
        Self {
            behavior: Arc::new(Mutex::new(WorkerBehavior::Ack)),
            calls: Arc::new(Mutex::new(Vec::new())),
            kills: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: WorkerBehavior) -> Self {
        let client = Self::new();
        client.set_behavior(behavior);
        client
    }

    pub fn set_behavior(&self, behavior: WorkerBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kills(&self) -> Vec<RecordedKill> {
        self.kills.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    fn answer(&self, worker: &WorkerInfo) -> Result<WorkerAck> {
        match self.behavior.lock().unwrap().clone() {
            WorkerBehavior::Ack => Ok(WorkerAck::ok()),
            WorkerBehavior::Reject(message) => Ok(WorkerAck::rejected(message)),
            WorkerBehavior::Unreachable => Err(TaskMeshError::DispatchFailure(format!(
                "worker {} unreachable",
                worker.worker_id
            ))),
        }
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn call_task(
        &self,
        worker: &WorkerInfo,
        srv_token: &str,
        request: &WorkerCallTaskRequest,
    ) -> Result<WorkerAck> {
        self.calls.lock().unwrap().push(RecordedCall {
            worker: worker.clone(),
            srv_token: srv_token.to_string(),
            request: request.clone(),
        });
        self.answer(worker)
    }

    async fn kill_task(
        &self,
        worker: &WorkerInfo,
        request: &WorkerKillTaskRequest,
    ) -> Result<WorkerAck> {
        self.kills.lock().unwrap().push(RecordedKill {
            worker: worker.clone(),
            request: request.clone(),
        });
        self.answer(worker)
    }
}

/// AuthService with bearer tokens and per-user denied permissions
#[derive(Debug, Clone, Default)]
pub struct MockAuthService {
    identities: Arc<Mutex<HashMap<String, Identity>>>,
    denied: Arc<Mutex<HashSet<(String, Permission)>>>,
}

impl MockAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, bearer: &str, user: &str) -> Self {
        self.identities.lock().unwrap().insert(
            bearer.to_string(),
            Identity {
                user: user.to_string(),
                roles: vec!["operator".to_string()],
            },
        );
        self
    }

    pub fn deny(&self, user: &str, permission: Permission) {
        self.denied
            .lock()
            .unwrap()
            .insert((user.to_string(), permission));
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn authenticate(&self, bearer: &str) -> Result<Identity> {
        self.identities
            .lock()
            .unwrap()
            .get(bearer)
            .cloned()
            .ok_or_else(|| TaskMeshError::Auth("unknown bearer".to_string()))
    }

    async fn authorize(&self, identity: &Identity, permission: Permission) -> Result<()> {
        if self
            .denied
            .lock()
            .unwrap()
            .contains(&(identity.user.clone(), permission))
        {
            return Err(TaskMeshError::Forbidden(format!(
                "{} may not {permission:?}",
                identity.user
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockTaskDefinitionRepository {
    definitions: Arc<Mutex<Vec<TaskDefinition>>>,
}

impl MockTaskDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(definitions: Vec<TaskDefinition>) -> Self {
        Self {
            definitions: Arc::new(Mutex::new(definitions)),
        }
    }

    pub fn add(&self, definition: TaskDefinition) {
        self.definitions.lock().unwrap().push(definition);
    }
}

#[async_trait]
impl TaskDefinitionRepository for MockTaskDefinitionRepository {
    async fn get_by_codename(&self, codename: &str) -> Result<Option<TaskDefinition>> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.codename == codename)
            .cloned())
    }

    async fn paged_list(
        &self,
        filter: &TaskDefinitionFilter,
        page: PageRequest,
    ) -> Result<Paged<TaskDefinition>> {
        let mut items: Vec<TaskDefinition> = self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                filter
                    .codename
                    .as_ref()
                    .is_none_or(|c| d.codename.contains(c.as_str()))
                    && filter
                        .modular
                        .as_ref()
                        .is_none_or(|m| d.codename.starts_with(&format!("{m}.")))
                    && filter.disabled.is_none_or(|v| d.disabled == v)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.codename.cmp(&b.codename));
        Ok(page_of(items, page))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<Vec<ScheduleDefinition>>>,
    fail: Arc<Mutex<bool>>,
    requested_pages: Arc<Mutex<Vec<i64>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<ScheduleDefinition>) -> Self {
        Self {
            schedules: Arc::new(Mutex::new(schedules)),
            ..Default::default()
        }
    }

    pub fn set_failure(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Hold every page request for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Page numbers requested so far, in order
    pub fn requested_pages(&self) -> Vec<i64> {
        self.requested_pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn paged_list(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> Result<Paged<ScheduleDefinition>> {
        self.requested_pages.lock().unwrap().push(page.page);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock().unwrap() {
            return Err(TaskMeshError::Storage("schedule table unavailable".to_string()));
        }
        let items: Vec<ScheduleDefinition> = self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                filter
                    .task_codename
                    .as_ref()
                    .is_none_or(|c| &s.task_codename == c)
                    && filter.disabled.is_none_or(|v| s.disabled == v)
            })
            .cloned()
            .collect();
        Ok(page_of(items, page))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInvocation {
    pub codename: String,
    pub arguments: serde_json::Value,
    pub caller: String,
    pub timeout_ms: i64,
}

/// Recording TaskCaller used by scheduler tests
#[derive(Debug, Clone, Default)]
pub struct MockTaskCaller {
    invocations: Arc<Mutex<Vec<RecordedInvocation>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockTaskCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn set_failure(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl TaskCaller for MockTaskCaller {
    async fn call_task(
        &self,
        codename: &str,
        arguments: serde_json::Value,
        caller: &str,
        timeout_ms: i64,
    ) -> Result<String> {
        let mut invocations = self.invocations.lock().unwrap();
        invocations.push(RecordedInvocation {
            codename: codename.to_string(),
            arguments,
            caller: caller.to_string(),
            timeout_ms,
        });
        if *self.fail.lock().unwrap() {
            return Err(TaskMeshError::NoWorkerAvailable(codename.to_string()));
        }
        Ok(format!("2024::{}", invocations.len()))
    }
}
