//! Workers poll a task queue and execute workflow and activity tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::activity::{Activity, ActivityContext};
use crate::context::WorkflowContext;
use crate::error::{ActivityError, FlowError, FlowResult};
use crate::registry::{ActivityRegistry, WorkflowRegistry};
use crate::service::{ActivityTask, ExecutionService, Task, WorkflowTask};
use crate::workflow::Workflow;

/// A worker bound to one task queue.
///
/// Register workflow types and activities, then `start` the polling loop.
/// Several workers may poll the same queue; each task goes to exactly one.
pub struct Worker {
    service: ExecutionService,
    task_queue: String,
    workflows: WorkflowRegistry,
    activities: ActivityRegistry,
}

impl Worker {
    pub fn new(service: ExecutionService, task_queue: impl Into<String>) -> Self {
        Self {
            service,
            task_queue: task_queue.into(),
            workflows: WorkflowRegistry::new(),
            activities: ActivityRegistry::new(),
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn register_workflow(&mut self, workflow: Arc<dyn Workflow>) -> &mut Self {
        self.workflows.register(workflow);
        self
    }

    pub fn register_activity(&mut self, activity: Arc<dyn Activity>) -> &mut Self {
        self.activities.register(activity);
        self
    }

    /// Register every activity of a prepared registry.
    pub fn register_activities(&mut self, registry: &ActivityRegistry) -> &mut Self {
        self.activities.merge(registry);
        self
    }

    /// Start polling in the background.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_queue = self.task_queue.clone();
        info!(
            "Starting worker on task queue {} ({} workflow type(s), {} activit(ies))",
            task_queue,
            self.workflows.len(),
            self.activities.len()
        );
        let join = tokio::spawn(self.poll(shutdown_rx));
        WorkerHandle {
            task_queue,
            shutdown: shutdown_tx,
            join,
        }
    }

    async fn poll(self, mut shutdown: watch::Receiver<bool>) {
        let queue = self.service.queue(&self.task_queue);
        let workflows = Arc::new(self.workflows);
        let activities = Arc::new(self.activities);

        let mut detached = false;

        loop {
            let polled = tokio::select! {
                task = async { queue.receiver.lock().await.recv().await } => match task {
                    Some(task) => Polled::Task(task),
                    None => Polled::Stop,
                },
                changed = shutdown.changed(), if !detached => match changed {
                    Ok(()) => Polled::Stop,
                    // Dropping the handle detaches the worker instead of stopping it.
                    Err(_) => Polled::Detached,
                },
            };

            match polled {
                Polled::Stop => {
                    debug!("Worker on {} stopped polling", self.task_queue);
                    break;
                }
                Polled::Detached => detached = true,
                Polled::Task(Task::Workflow(task)) => {
                    let service = self.service.clone();
                    let workflows = Arc::clone(&workflows);
                    tokio::spawn(run_workflow_task(service, workflows, task));
                }
                Polled::Task(Task::Activity(task)) => {
                    let activities = Arc::clone(&activities);
                    tokio::spawn(run_activity_task(activities, task));
                }
            }
        }
    }
}

enum Polled {
    Task(Task),
    Detached,
    Stop,
}

async fn run_workflow_task(
    service: ExecutionService,
    workflows: Arc<WorkflowRegistry>,
    task: WorkflowTask,
) {
    let WorkflowTask { run, reply } = task;
    let outcome = execute_run(service, &workflows, run).await;
    if reply.send(outcome).is_err() {
        warn!("Workflow result dropped: submitter is gone");
    }
}

async fn execute_run(
    service: ExecutionService,
    workflows: &WorkflowRegistry,
    run: crate::history::WorkflowRun,
) -> FlowResult<serde_json::Value> {
    let workflow = workflows.get_required(&run.workflow_type)?;
    info!(
        "Executing workflow {} run {} (attempt {})",
        run.workflow_type, run.run_id, run.attempt
    );

    let mut ctx = WorkflowContext::new(service, run);
    ctx.mark_started().await?;
    let outcome = workflow.run(&mut ctx).await;
    if let Err(e) = &outcome {
        error!("Workflow run {} failed: {}", ctx.run_id(), e);
    }
    ctx.finish(outcome).await
}

async fn run_activity_task(activities: Arc<ActivityRegistry>, task: ActivityTask) {
    let ActivityTask {
        info,
        input,
        start_to_close,
        reply,
    } = task;

    let outcome = match activities.get(&info.activity_type) {
        Some(activity) => {
            let name = info.activity_type.clone();
            execute_attempt(activity, ActivityContext::new(info), input, start_to_close, &name).await
        }
        None => Err(ActivityError::non_retryable(format!(
            "activity type '{}' is not registered on task queue '{}'",
            info.activity_type, info.task_queue
        ))),
    };

    if reply.send(outcome).is_err() {
        warn!("Activity result dropped: workflow is gone");
    }
}

async fn execute_attempt(
    activity: Arc<dyn Activity>,
    ctx: ActivityContext,
    input: serde_json::Value,
    start_to_close: Duration,
    name: &str,
) -> Result<serde_json::Value, ActivityError> {
    debug!("Executing activity {} attempt {}", name, ctx.attempt());
    match tokio::time::timeout(start_to_close, activity.execute(ctx, input)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ActivityError::timeout(format!(
            "activity '{}' exceeded start-to-close timeout of {:?}",
            name, start_to_close
        ))),
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    task_queue: String,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Stop polling. Tasks already picked up run to completion.
    pub async fn shutdown(self) -> FlowResult<()> {
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| FlowError::WorkerShutdown(format!("worker task panicked: {}", e)))
    }

    /// Wait until the worker stops.
    pub async fn join(self) -> FlowResult<()> {
        self.join
            .await
            .map_err(|e| FlowError::WorkerShutdown(format!("worker task panicked: {}", e)))
    }
}
