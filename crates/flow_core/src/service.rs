//! Connection to the durable-execution service.
//!
//! The service owns the task queues and the history store. Workers poll
//! queues; clients and workflow contexts dispatch tasks onto them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::ActivityInfo;
use crate::error::{ActivityError, ActivityResult, FlowError, FlowResult};
use crate::history::{FileHistoryStore, HistoryStore, MemoryHistoryStore, WorkflowRun};
use crate::options::RetryPolicy;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Target naming a private in-process service.
pub const LOCAL_TARGET: &str = "local";

/// Scheme of named in-process targets. Connections to the same name share
/// task queues and run history.
pub const INPROC_SCHEME: &str = "inproc://";

/// Connection settings for the execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Network target (`local` or `inproc://<name>`)
    pub target: String,
    /// Logical namespace; empty selects the default namespace
    pub namespace: String,
    /// Namespaces that exist on the service
    pub namespaces: Vec<String>,
    /// Directory for persisted run history (in memory when unset)
    pub history_dir: Option<PathBuf>,
    /// Retry policy for activities that do not override it
    pub default_activity_retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            target: LOCAL_TARGET.to_string(),
            namespace: String::new(),
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
            history_dir: None,
            default_activity_retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(target: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = Some(dir.into());
        self
    }

    /// Declare a namespace that exists on the service.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    pub fn default_activity_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_activity_retry = policy;
        self
    }

    /// The namespace runs are created in.
    pub fn effective_namespace(&self) -> &str {
        if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }
}

/// A task waiting on a queue.
pub(crate) enum Task {
    Workflow(WorkflowTask),
    Activity(ActivityTask),
}

pub(crate) struct WorkflowTask {
    pub run: WorkflowRun,
    pub reply: oneshot::Sender<FlowResult<serde_json::Value>>,
}

pub(crate) struct ActivityTask {
    pub info: ActivityInfo,
    pub input: serde_json::Value,
    pub start_to_close: Duration,
    pub reply: oneshot::Sender<ActivityResult<serde_json::Value>>,
}

/// Sending and polling ends of one task queue.
#[derive(Clone)]
pub(crate) struct TaskQueue {
    pub sender: mpsc::UnboundedSender<Task>,
    pub receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>>,
}

impl TaskQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }
}

/// Task queues and run history behind a target.
struct Backplane {
    history_dir: Option<PathBuf>,
    store: Arc<dyn HistoryStore>,
    queues: Mutex<HashMap<String, TaskQueue>>,
}

impl Backplane {
    fn new(history_dir: Option<PathBuf>, store: Arc<dyn HistoryStore>) -> Arc<Self> {
        Arc::new(Self {
            history_dir,
            store,
            queues: Mutex::new(HashMap::new()),
        })
    }
}

/// Live backplanes of named `inproc://` targets.
fn named_targets() -> &'static Mutex<HashMap<String, Weak<Backplane>>> {
    static TARGETS: OnceLock<Mutex<HashMap<String, Weak<Backplane>>>> = OnceLock::new();
    TARGETS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn default_store(config: &ServiceConfig) -> Arc<dyn HistoryStore> {
    match &config.history_dir {
        Some(dir) => Arc::new(FileHistoryStore::new(dir)),
        None => Arc::new(MemoryHistoryStore::new()),
    }
}

struct ServiceInner {
    config: ServiceConfig,
    backplane: Arc<Backplane>,
}

/// Handle to a connected execution service. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionService {
    inner: Arc<ServiceInner>,
}

impl ExecutionService {
    /// Connect to the service described by `config`.
    ///
    /// A non-empty namespace must already exist on the service. Connections
    /// to the same `inproc://<name>` target share queues and history; they
    /// must agree on the history directory.
    pub fn connect(config: ServiceConfig) -> FlowResult<Self> {
        validate(&config)?;
        if !config.target.starts_with(INPROC_SCHEME) {
            let backplane = Backplane::new(config.history_dir.clone(), default_store(&config));
            return Ok(Self::attach(config, backplane));
        }

        let mut targets = named_targets().lock();
        if let Some(existing) = targets.get(&config.target).and_then(Weak::upgrade) {
            if existing.history_dir != config.history_dir {
                return Err(FlowError::Connection(format!(
                    "target '{}' already records history in {:?}",
                    config.target, existing.history_dir
                )));
            }
            debug!("Joining live target {}", config.target);
            drop(targets);
            return Ok(Self::attach(config, existing));
        }

        let backplane = Backplane::new(config.history_dir.clone(), default_store(&config));
        targets.insert(config.target.clone(), Arc::downgrade(&backplane));
        drop(targets);
        Ok(Self::attach(config, backplane))
    }

    /// Connect using an explicit history store.
    ///
    /// A named `inproc://` target must not already be live.
    pub fn connect_with_store(
        config: ServiceConfig,
        store: Arc<dyn HistoryStore>,
    ) -> FlowResult<Self> {
        validate(&config)?;
        let backplane = Backplane::new(config.history_dir.clone(), store);
        if config.target.starts_with(INPROC_SCHEME) {
            let mut targets = named_targets().lock();
            if targets.get(&config.target).and_then(Weak::upgrade).is_some() {
                return Err(FlowError::Connection(format!(
                    "target '{}' is already live with its own history store",
                    config.target
                )));
            }
            targets.insert(config.target.clone(), Arc::downgrade(&backplane));
        }
        Ok(Self::attach(config, backplane))
    }

    fn attach(config: ServiceConfig, backplane: Arc<Backplane>) -> Self {
        info!(
            "Connected to execution service {} (namespace {})",
            config.target,
            config.effective_namespace()
        );
        Self {
            inner: Arc::new(ServiceInner { config, backplane }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn namespace(&self) -> &str {
        self.inner.config.effective_namespace()
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.inner.backplane.store
    }

    /// Persist a run without blocking the async task.
    pub(crate) async fn persist(&self, run: &WorkflowRun) -> FlowResult<()> {
        let store = Arc::clone(self.store());
        let run = run.clone();
        tokio::task::spawn_blocking(move || store.save(&run))
            .await
            .map_err(|e| FlowError::InvalidState(format!("history write task failed: {}", e)))?
    }

    /// Load a run without blocking the async task.
    pub(crate) async fn load(&self, run_id: Uuid) -> FlowResult<WorkflowRun> {
        let store = Arc::clone(self.store());
        tokio::task::spawn_blocking(move || store.load(run_id))
            .await
            .map_err(|e| FlowError::InvalidState(format!("history read task failed: {}", e)))?
    }

    pub fn default_activity_retry(&self) -> &RetryPolicy {
        &self.inner.config.default_activity_retry
    }

    pub(crate) fn queue(&self, name: &str) -> TaskQueue {
        self.inner
            .backplane
            .queues
            .lock()
            .entry(name.to_string())
            .or_insert_with(TaskQueue::new)
            .clone()
    }

    fn enqueue(&self, queue: &str, task: Task) -> FlowResult<()> {
        self.queue(queue)
            .sender
            .send(task)
            .map_err(|_| FlowError::WorkerShutdown(format!("task queue '{}' is closed", queue)))
    }

    /// Route a workflow run to a worker and wait for its outcome.
    pub(crate) async fn dispatch_workflow(
        &self,
        run: WorkflowRun,
    ) -> FlowResult<serde_json::Value> {
        let queue = run.task_queue.clone();
        let run_id = run.run_id;
        let (reply, rx) = oneshot::channel();
        debug!("Dispatching workflow run {} to queue {}", run_id, queue);
        self.enqueue(&queue, Task::Workflow(WorkflowTask { run, reply }))?;
        rx.await.map_err(|_| {
            FlowError::WorkerShutdown(format!("worker dropped workflow run {}", run_id))
        })?
    }

    /// Route one activity attempt to a worker and wait for its outcome.
    pub(crate) async fn dispatch_activity(
        &self,
        info: ActivityInfo,
        input: serde_json::Value,
        start_to_close: Duration,
    ) -> ActivityResult<serde_json::Value> {
        let queue = info.task_queue.clone();
        let activity_type = info.activity_type.clone();
        let (reply, rx) = oneshot::channel();
        debug!(
            "Dispatching activity {} attempt {} to queue {}",
            activity_type, info.attempt, queue
        );
        self.enqueue(
            &queue,
            Task::Activity(ActivityTask {
                info,
                input,
                start_to_close,
                reply,
            }),
        )
        .map_err(|e| ActivityError::retryable(e.to_string()))?;
        rx.await.map_err(|_| {
            ActivityError::retryable(format!("worker dropped activity {}", activity_type))
        })?
    }
}

fn validate(config: &ServiceConfig) -> FlowResult<()> {
    if config.target != LOCAL_TARGET && !config.target.starts_with(INPROC_SCHEME) {
        return Err(FlowError::Connection(format!(
            "unsupported target '{}' (expected '{}' or '{}<name>')",
            config.target, LOCAL_TARGET, INPROC_SCHEME
        )));
    }

    let namespace = config.effective_namespace();
    if !config.namespaces.iter().any(|n| n == namespace) {
        return Err(FlowError::NamespaceNotFound(namespace.to_string()));
    }
    Ok(())
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("target", &self.inner.config.target)
            .field("namespace", &self.namespace())
            .finish()
    }
}
