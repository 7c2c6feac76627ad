//! Integration tests for the workflow layer.
//!
//! These run real workers against the in-process service with paused tokio
//! time, so retry backoff and timeouts elapse instantly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use async_trait::async_trait;
use flow_core::{
    ActivityError, ActivityOptions, ExecutionService, FlowError, FlowResult, FnActivity,
    HistoryEvent, HistoryStore, MemoryHistoryStore, RetryPolicy, RunStatus, ServiceConfig, Worker,
    WorkflowClient, WorkflowContext, WorkflowOptions, WorkflowRun, Workflow,
};
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

const QUEUE: &str = "TEST";
const SIDE_QUEUE: &str = "TEST-SIDE";

/// id → first(id) → second(first) → side-queue(second)
struct ChainWorkflow {
    options: ActivityOptions,
    side_options: ActivityOptions,
}

impl ChainWorkflow {
    fn new(options: ActivityOptions) -> Self {
        Self {
            side_options: ActivityOptions::new(Duration::from_secs(10))
                .task_queue(SIDE_QUEUE)
                .retry_policy(RetryPolicy::no_retries()),
            options,
        }
    }

    fn with_side_options(mut self, options: ActivityOptions) -> Self {
        self.side_options = options;
        self
    }
}

#[async_trait]
impl Workflow for ChainWorkflow {
    fn workflow_type(&self) -> &str {
        "ChainWorkflow"
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> FlowResult<serde_json::Value> {
        let id = ctx.random_uuid().await?.to_string();
        let first: String = ctx.execute_activity("first", &id, &self.options).await?;
        let second: String = ctx.execute_activity("second", &first, &self.options).await?;
        let side: String = ctx
            .execute_activity("side", &second, &self.side_options)
            .await?;
        Ok(serde_json::json!({ "id": id, "second": second, "side": side }))
    }
}

#[derive(Default)]
struct Calls {
    first: AtomicU32,
    second: AtomicU32,
    side: AtomicU32,
}

fn connect() -> (ExecutionService, Arc<MemoryHistoryStore>) {
    let store = Arc::new(MemoryHistoryStore::new());
    let service = ExecutionService::connect_with_store(
        ServiceConfig::default().default_activity_retry(
            RetryPolicy::new()
                .initial_interval(Duration::from_secs(1))
                .maximum_attempts(3),
        ),
        store.clone(),
    )
    .unwrap();
    (service, store)
}

/// `first` fails its first `first_failures` attempts; `side` fails its first `side_failures`.
fn start_workers(
    service: &ExecutionService,
    workflow: ChainWorkflow,
    calls: Arc<Calls>,
    first_failures: u32,
    side_failures: u32,
) {
    let mut worker = Worker::new(service.clone(), QUEUE);
    worker.register_workflow(Arc::new(workflow));

    let c = calls.clone();
    worker.register_activity(Arc::new(FnActivity::typed("first", move |ctx, id: String| {
        let c = c.clone();
        async move {
            c.first.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt() <= first_failures {
                return Err(ActivityError::retryable(format!("attempt {} unavailable", ctx.attempt())));
            }
            Ok(format!("first-{}-attempt-{}", id, ctx.attempt()))
        }
    })));

    let c = calls.clone();
    worker.register_activity(Arc::new(FnActivity::typed("second", move |_ctx, input: String| {
        let c = c.clone();
        async move {
            c.second.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ActivityError>(format!("second({})", input))
        }
    })));
    let _ = worker.start();

    let mut side = Worker::new(service.clone(), SIDE_QUEUE);
    let c = calls;
    side.register_activity(Arc::new(FnActivity::typed("side", move |ctx, input: String| {
        let c = c.clone();
        async move {
            c.side.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt() <= side_failures {
                return Err(ActivityError::retryable("script worker busy"));
            }
            Ok(format!("side({})", input))
        }
    })));
    let _ = side.start();
}

fn default_options() -> ActivityOptions {
    ActivityOptions::new(Duration::from_secs(3600))
}

#[tokio::test(start_paused = true)]
async fn test_workflow_routes_across_queues() {
    let (service, _) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), 0, 0);

    let client = WorkflowClient::new(service);
    let result: serde_json::Value = client
        .execute("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap();

    let id = result["id"].as_str().unwrap();
    assert_eq!(result["second"], format!("second(first-{}-attempt-1)", id));
    assert_eq!(result["side"], format!("side(second(first-{}-attempt-1))", id));
    assert_eq!(calls.side.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_activity_succeeds_after_transient_failures() {
    let (service, _) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), 2, 0);

    let client = WorkflowClient::new(service);
    let result: serde_json::Value = client
        .execute("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap();

    let id = result["id"].as_str().unwrap();
    assert_eq!(calls.first.load(Ordering::SeqCst), 3);
    // The value flowing downstream is the one produced by the successful attempt.
    assert_eq!(result["second"], format!("second(first-{}-attempt-3)", id));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_activity_fails_run_without_downstream_calls() {
    let (service, store) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), u32::MAX, 0);

    let client = WorkflowClient::new(service);
    let handle = client
        .start("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap();
    let run_id = handle.run_id();
    let err = handle.result::<serde_json::Value>().await.unwrap_err();

    assert!(matches!(err, FlowError::ActivityFailed { ref activity_type, .. } if activity_type == "first"));
    assert!(!err.is_timeout());
    assert_eq!(calls.first.load(Ordering::SeqCst), 3);
    assert_eq!(calls.second.load(Ordering::SeqCst), 0);
    assert_eq!(calls.side.load(Ordering::SeqCst), 0);

    let run = store.load(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(matches!(run.history.last(), Some(HistoryEvent::WorkflowFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_is_observable_and_non_decreasing() {
    let (service, store) = connect();
    let calls = Arc::new(Calls::default());
    let side_options = ActivityOptions::new(Duration::from_secs(1000))
        .task_queue(SIDE_QUEUE)
        .retry_policy(
            RetryPolicy::new()
                .initial_interval(Duration::from_secs(30))
                .maximum_attempts(5),
        );

    let attempts_at: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let workflow = ChainWorkflow::new(default_options()).with_side_options(side_options);

    let mut worker = Worker::new(service.clone(), QUEUE);
    worker.register_workflow(Arc::new(workflow));
    worker.register_activity(Arc::new(FnActivity::typed("first", |_ctx, id: String| async move {
        Ok::<_, ActivityError>(id)
    })));
    worker.register_activity(Arc::new(FnActivity::typed("second", |_ctx, s: String| async move {
        Ok::<_, ActivityError>(s)
    })));
    let _worker = worker.start();

    let mut side = Worker::new(service.clone(), SIDE_QUEUE);
    let seen = attempts_at.clone();
    let c = calls.clone();
    side.register_activity(Arc::new(FnActivity::typed("side", move |ctx, input: String| {
        let seen = seen.clone();
        let c = c.clone();
        async move {
            c.side.fetch_add(1, Ordering::SeqCst);
            seen.lock().push(Instant::now());
            if ctx.attempt() < 5 {
                return Err(ActivityError::retryable("not yet"));
            }
            Ok(input)
        }
    })));
    let _side = side.start();

    let client = WorkflowClient::new(service);
    let handle = client
        .start("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap();
    let run_id = handle.run_id();
    handle.result::<serde_json::Value>().await.unwrap();

    assert_eq!(calls.side.load(Ordering::SeqCst), 5);

    let seen = attempts_at.lock().clone();
    let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps.len(), 4);
    assert!(gaps[0] >= Duration::from_secs(30));
    assert!(gaps.windows(2).all(|w| w[0] <= w[1]));

    // The side activity is the fourth command (uuid, first, second, side).
    let recorded = store.load(run_id).unwrap().backoffs(4);
    assert_eq!(recorded, vec![30_000, 60_000, 120_000, 240_000]);
}

#[tokio::test(start_paused = true)]
async fn test_activity_timeout_is_classified() {
    let (service, _) = connect();
    let options = ActivityOptions::new(Duration::from_secs(3600)).retry_policy(RetryPolicy::no_retries());

    let mut worker = Worker::new(service.clone(), QUEUE);
    worker.register_workflow(Arc::new(ChainWorkflow::new(options)));
    worker.register_activity(Arc::new(FnActivity::typed("first", |_ctx, _id: String| async move {
        std::future::pending::<()>().await;
        Ok::<_, ActivityError>(String::new())
    })));
    let _worker = worker.start();

    let started = Instant::now();
    let client = WorkflowClient::new(service);
    let err = client
        .execute::<serde_json::Value>("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() >= Duration::from_secs(3600));
}

#[tokio::test(start_paused = true)]
async fn test_workflow_level_retry_starts_from_scratch() {
    let (service, store) = connect();
    let options = default_options().retry_policy(RetryPolicy::no_retries());
    let seen_ids: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let runs = Arc::new(AtomicU32::new(0));

    let mut worker = Worker::new(service.clone(), QUEUE);
    worker.register_workflow(Arc::new(ChainWorkflow::new(options)));
    let ids = seen_ids.clone();
    let counter = runs.clone();
    worker.register_activity(Arc::new(FnActivity::typed("first", move |_ctx, id: String| {
        let ids = ids.clone();
        let counter = counter.clone();
        async move {
            ids.lock().push(id.clone());
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(ActivityError::retryable("flaky"));
            }
            Ok(id)
        }
    })));
    worker.register_activity(Arc::new(FnActivity::typed("second", |_ctx, s: String| async move {
        Ok::<_, ActivityError>(s)
    })));
    let _worker = worker.start();

    let mut side = Worker::new(service.clone(), SIDE_QUEUE);
    side.register_activity(Arc::new(FnActivity::typed("side", |_ctx, s: String| async move {
        Ok::<_, ActivityError>(s)
    })));
    let _side = side.start();

    let client = WorkflowClient::new(service);
    let handle = client
        .start(
            "ChainWorkflow",
            WorkflowOptions::new(QUEUE)
                .workflow_id("retry-me")
                .retry_policy(RetryPolicy::new().maximum_attempts(3)),
        )
        .await
        .unwrap();
    let result: serde_json::Value = handle.result().await.unwrap();

    let ids = seen_ids.lock().clone();
    assert_eq!(ids.len(), 3);
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_eq!(result["id"], ids[2]);

    let attempts = store.runs_for("retry-me").unwrap();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].status, RunStatus::Failed);
    assert_eq!(attempts[2].status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_workflow_is_not_retried() {
    let (service, _) = connect();
    let _worker = Worker::new(service.clone(), QUEUE).start();

    let client = WorkflowClient::new(service);
    let err = client
        .execute::<serde_json::Value>(
            "Missing",
            WorkflowOptions::new(QUEUE).retry_policy(RetryPolicy::new().maximum_attempts(3)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::WorkflowNotRegistered(name) if name == "Missing"));
}

#[tokio::test(start_paused = true)]
async fn test_resume_replays_recorded_history() {
    let (service, store) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), 0, 0);

    // A run that crashed after `first` completed.
    let script_id = Uuid::new_v4().to_string();
    let mut run = WorkflowRun::new("crashed", "ChainWorkflow", QUEUE, "default", 1);
    run.status = RunStatus::Running;
    run.record(HistoryEvent::SideEffectRecorded {
        seq: 1,
        value: serde_json::json!(script_id),
    });
    run.record(HistoryEvent::ActivityScheduled {
        seq: 2,
        activity_type: "first".to_string(),
        task_queue: QUEUE.to_string(),
        input: serde_json::json!(script_id),
    });
    run.record(HistoryEvent::ActivityCompleted {
        seq: 2,
        result: serde_json::json!("recorded-first"),
    });
    store.save(&run).unwrap();

    let client = WorkflowClient::new(service);
    let result: serde_json::Value = client.resume(run.run_id).await.unwrap().result().await.unwrap();

    assert_eq!(result["id"], script_id);
    assert_eq!(result["second"], "second(recorded-first)");
    assert_eq!(calls.first.load(Ordering::SeqCst), 0);
    assert_eq!(calls.second.load(Ordering::SeqCst), 1);

    // A completed run resumes to its stored result without executing.
    let again: serde_json::Value = client.resume(run.run_id).await.unwrap().result().await.unwrap();
    assert_eq!(again, result);
    assert_eq!(calls.second.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replay_detects_non_determinism() {
    let (service, store) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), 0, 0);

    let mut run = WorkflowRun::new("diverged", "ChainWorkflow", QUEUE, "default", 1);
    run.status = RunStatus::Running;
    run.record(HistoryEvent::SideEffectRecorded {
        seq: 1,
        value: serde_json::json!(Uuid::new_v4()),
    });
    run.record(HistoryEvent::ActivityScheduled {
        seq: 2,
        activity_type: "somethingElse".to_string(),
        task_queue: QUEUE.to_string(),
        input: serde_json::Value::Null,
    });
    store.save(&run).unwrap();

    let client = WorkflowClient::new(service);
    let err = client
        .resume(run.run_id)
        .await
        .unwrap()
        .result::<serde_json::Value>()
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NonDeterminism(_)));
    assert_eq!(calls.first.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_replay_rejects_completed_activity_of_another_type() {
    let (service, store) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), 0, 0);

    let mut run = WorkflowRun::new("renamed", "ChainWorkflow", QUEUE, "default", 1);
    run.status = RunStatus::Running;
    run.record(HistoryEvent::SideEffectRecorded {
        seq: 1,
        value: serde_json::json!(Uuid::new_v4()),
    });
    run.record(HistoryEvent::ActivityScheduled {
        seq: 2,
        activity_type: "second".to_string(),
        task_queue: QUEUE.to_string(),
        input: serde_json::Value::Null,
    });
    run.record(HistoryEvent::ActivityCompleted {
        seq: 2,
        result: serde_json::json!("recorded-second"),
    });
    store.save(&run).unwrap();

    let client = WorkflowClient::new(service);
    let err = client
        .resume(run.run_id)
        .await
        .unwrap()
        .result::<serde_json::Value>()
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NonDeterminism(ref msg) if msg.contains("'second'") && msg.contains("'first'")));
    assert_eq!(calls.first.load(Ordering::SeqCst), 0);
    assert_eq!(calls.second.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_replay_rejects_activity_where_side_effect_was_recorded() {
    let (service, store) = connect();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls.clone(), 0, 0);

    let mut run = WorkflowRun::new("reordered", "ChainWorkflow", QUEUE, "default", 1);
    run.status = RunStatus::Running;
    run.record(HistoryEvent::ActivityScheduled {
        seq: 1,
        activity_type: "first".to_string(),
        task_queue: QUEUE.to_string(),
        input: serde_json::Value::Null,
    });
    run.record(HistoryEvent::ActivityFailed {
        seq: 1,
        error: ActivityError::non_retryable("recorded failure"),
    });
    store.save(&run).unwrap();

    let client = WorkflowClient::new(service);
    let err = client
        .resume(run.run_id)
        .await
        .unwrap()
        .result::<serde_json::Value>()
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NonDeterminism(_)));
    assert_eq!(calls.first.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_is_not_resumable() {
    let (service, store) = connect();
    let mut run = WorkflowRun::new("gave-up", "ChainWorkflow", QUEUE, "default", 3);
    run.status = RunStatus::Failed;
    store.save(&run).unwrap();

    let client = WorkflowClient::new(service);
    let described = client.describe(run.run_id).await.unwrap();
    assert_eq!(described.status, RunStatus::Failed);
    assert_eq!(described.attempt, 3);
    assert!(!described.can_resume());

    assert!(matches!(
        client.resume(run.run_id).await,
        Err(FlowError::InvalidState(_))
    ));
    assert!(matches!(
        client.describe(Uuid::new_v4()).await,
        Err(FlowError::RunNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_worker_and_client_on_separate_connections() {
    let target = "inproc://workflow-tests-shared";
    let worker_side = ExecutionService::connect(ServiceConfig::new(target, "")).unwrap();
    let client_side = ExecutionService::connect(ServiceConfig::new(target, "")).unwrap();
    let calls = Arc::new(Calls::default());
    start_workers(&worker_side, ChainWorkflow::new(default_options()), calls.clone(), 0, 0);

    let client = WorkflowClient::new(client_side);
    let handle = client
        .start("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap();
    let run_id = handle.run_id();
    let result: serde_json::Value = handle.result().await.unwrap();

    let id = result["id"].as_str().unwrap();
    assert_eq!(result["side"], format!("side(second(first-{}-attempt-1))", id));
    assert_eq!(calls.side.load(Ordering::SeqCst), 1);

    // Both connections see the same history.
    let run = worker_side.store().load(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

/// Records which thread each save ran on.
#[derive(Default)]
struct ThreadTrackingStore {
    inner: MemoryHistoryStore,
    save_threads: Mutex<Vec<ThreadId>>,
}

impl HistoryStore for ThreadTrackingStore {
    fn save(&self, run: &WorkflowRun) -> FlowResult<()> {
        self.save_threads.lock().push(thread::current().id());
        self.inner.save(run)
    }

    fn load(&self, run_id: Uuid) -> FlowResult<WorkflowRun> {
        self.inner.load(run_id)
    }

    fn runs_for(&self, workflow_id: &str) -> FlowResult<Vec<WorkflowRun>> {
        self.inner.runs_for(workflow_id)
    }
}

#[tokio::test]
async fn test_history_writes_leave_the_runtime_thread() {
    let store = Arc::new(ThreadTrackingStore::default());
    let service = ExecutionService::connect_with_store(ServiceConfig::default(), store.clone()).unwrap();
    let calls = Arc::new(Calls::default());
    start_workers(&service, ChainWorkflow::new(default_options()), calls, 0, 0);

    let client = WorkflowClient::new(service);
    let _: serde_json::Value = client
        .execute("ChainWorkflow", WorkflowOptions::new(QUEUE))
        .await
        .unwrap();

    // The current-thread runtime drives every task on this thread.
    let runtime_thread = thread::current().id();
    let saves = store.save_threads.lock().clone();
    assert!(saves.len() >= 6);
    assert!(saves.iter().all(|id| *id != runtime_thread));
}

#[tokio::test]
async fn test_worker_shutdown() {
    let (service, _) = connect();
    let handle = Worker::new(service, QUEUE).start();
    assert_eq!(handle.task_queue(), QUEUE);
    handle.shutdown().await.unwrap();
}
