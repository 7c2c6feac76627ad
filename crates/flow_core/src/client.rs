//! Client side: submit, await and resume workflow runs.

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use crate::history::WorkflowRun;
use crate::options::WorkflowOptions;
use crate::service::ExecutionService;
use crate::workflow::RunStatus;

/// Client for submitting workflow runs.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    service: ExecutionService,
}

impl WorkflowClient {
    pub fn new(service: ExecutionService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ExecutionService {
        &self.service
    }

    /// Submit a new run and return a handle to it.
    pub async fn start(
        &self,
        workflow_type: &str,
        options: WorkflowOptions,
    ) -> FlowResult<WorkflowHandle> {
        let workflow_id = options
            .workflow_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", workflow_type, Uuid::new_v4()));

        let run = WorkflowRun::new(
            &workflow_id,
            workflow_type,
            &options.task_queue,
            self.service.namespace(),
            1,
        )
        .with_retry_policy(options.retry_policy.clone());
        self.service.persist(&run).await?;

        info!(
            "Submitted workflow {} ({}) run {} on queue {}",
            workflow_type, workflow_id, run.run_id, options.task_queue
        );
        Ok(self.spawn_attempts(run))
    }

    /// Submit a new run and block until it finishes.
    pub async fn execute<O: DeserializeOwned>(
        &self,
        workflow_type: &str,
        options: WorkflowOptions,
    ) -> FlowResult<O> {
        self.start(workflow_type, options).await?.result().await
    }

    /// Resume an interrupted run from its persisted history.
    ///
    /// Completed runs return their recorded result without executing again.
    pub async fn resume(&self, run_id: Uuid) -> FlowResult<WorkflowHandle> {
        let run = self.service.load(run_id).await?;
        match run.status {
            RunStatus::Completed => {
                let result = run.result.clone().unwrap_or(serde_json::Value::Null);
                Ok(WorkflowHandle {
                    workflow_id: run.workflow_id,
                    run_id,
                    join: tokio::spawn(async move { Ok(result) }),
                })
            }
            _ if !run.can_resume() => Err(FlowError::InvalidState(format!(
                "run {} is not resumable (status={:?})",
                run_id, run.status
            ))),
            _ => {
                info!(
                    "Resuming workflow {} run {} from {} recorded event(s)",
                    run.workflow_id,
                    run_id,
                    run.history.len()
                );
                Ok(self.spawn_attempts(run))
            }
        }
    }

    /// Load a run's persisted state.
    pub async fn describe(&self, run_id: Uuid) -> FlowResult<WorkflowRun> {
        self.service.load(run_id).await
    }

    fn spawn_attempts(&self, first: WorkflowRun) -> WorkflowHandle {
        let service = self.service.clone();
        let workflow_id = first.workflow_id.clone();
        let run_id = first.run_id;

        let join = tokio::spawn(async move {
            let mut run = first;
            loop {
                let next = run.next_attempt();
                let attempt = run.attempt;
                let policy = run.retry_policy.clone();

                let error = match service.dispatch_workflow(run).await {
                    Ok(result) => return Ok(result),
                    Err(e) => e,
                };

                let retry = policy
                    .as_ref()
                    .filter(|p| error.is_retryable() && p.allows_attempt_after(attempt));
                let Some(policy) = retry else {
                    return Err(error);
                };

                let backoff = policy.backoff(attempt);
                warn!(
                    "Workflow {} attempt {} failed: {}; retrying in {:?}",
                    next.workflow_id, attempt, error, backoff
                );
                tokio::time::sleep(backoff).await;
                service.persist(&next).await?;
                run = next;
            }
        });

        WorkflowHandle {
            workflow_id,
            run_id,
            join,
        }
    }
}

/// Handle to a submitted workflow.
#[derive(Debug)]
pub struct WorkflowHandle {
    workflow_id: String,
    run_id: Uuid,
    join: JoinHandle<FlowResult<serde_json::Value>>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Run id of the first attempt covered by this handle.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the final outcome across all workflow-level attempts.
    pub async fn result<O: DeserializeOwned>(self) -> FlowResult<O> {
        let value = self
            .join
            .await
            .map_err(|e| FlowError::WorkflowExecutionFailed(format!("run task panicked: {}", e)))??;
        serde_json::from_value(value).map_err(|e| FlowError::Serialization(e.to_string()))
    }
}
