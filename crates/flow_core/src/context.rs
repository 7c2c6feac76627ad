//! Workflow context: the deterministic primitives a workflow may use.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::activity::ActivityInfo;
use crate::error::{FlowError, FlowResult};
use crate::history::{HistoryEvent, RecordedActivity, RecordedCommand, WorkflowRun};
use crate::options::ActivityOptions;
use crate::service::ExecutionService;
use crate::workflow::RunStatus;

/// Execution context of a single workflow run.
///
/// Each call to `random_uuid` or `execute_activity` takes the next sequence
/// number. When the run is replayed from history, calls whose outcome is
/// already recorded return it without touching the outside world.
pub struct WorkflowContext {
    service: ExecutionService,
    run: WorkflowRun,
    next_seq: u64,
}

impl WorkflowContext {
    pub(crate) fn new(service: ExecutionService, run: WorkflowRun) -> Self {
        Self {
            service,
            run,
            next_seq: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.run.workflow_id
    }

    /// Workflow-level attempt this run belongs to.
    pub fn attempt(&self) -> u32 {
        self.run.attempt
    }

    pub fn task_queue(&self) -> &str {
        &self.run.task_queue
    }

    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    async fn record(&mut self, event: HistoryEvent) -> FlowResult<()> {
        self.run.record(event);
        self.service.persist(&self.run).await
    }

    /// Fail replay when history holds a different command at `seq`.
    fn check_replay(&self, seq: u64, issued: RecordedCommand<'_>) -> FlowResult<()> {
        match self.run.recorded_command(seq) {
            Some(recorded) if recorded != issued => Err(FlowError::NonDeterminism(format!(
                "command {} was {} in history but {} on replay",
                seq, recorded, issued
            ))),
            _ => Ok(()),
        }
    }

    /// A random v4 UUID, recorded so replays see the same value.
    pub async fn random_uuid(&mut self) -> FlowResult<Uuid> {
        let seq = self.take_seq();
        self.check_replay(seq, RecordedCommand::SideEffect)?;
        if let Some(value) = self.run.side_effect(seq) {
            return decode(value.clone());
        }

        let id = Uuid::new_v4();
        self.record(HistoryEvent::SideEffectRecorded {
            seq,
            value: serde_json::json!(id),
        })
        .await?;
        Ok(id)
    }

    /// Schedule an activity and wait for its final outcome.
    ///
    /// Failed attempts are retried with backoff per the options' retry policy
    /// (or the service default). The workflow only sees the completed result
    /// or the failure that ended the retries.
    pub async fn execute_activity<I, O>(
        &mut self,
        activity_type: &str,
        input: &I,
        options: &ActivityOptions,
    ) -> FlowResult<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let seq = self.take_seq();
        let input = serde_json::to_value(input).map_err(|e| FlowError::Serialization(e.to_string()))?;
        let task_queue = options
            .task_queue
            .clone()
            .unwrap_or_else(|| self.run.task_queue.clone());
        let policy = options
            .retry_policy
            .clone()
            .unwrap_or_else(|| self.service.default_activity_retry().clone());

        self.check_replay(seq, RecordedCommand::Activity(activity_type))?;
        let mut attempt = match self.run.activity(seq) {
            Some(RecordedActivity::Completed(value)) => {
                debug!("Replayed activity {} (seq {})", activity_type, seq);
                return decode(value);
            }
            Some(RecordedActivity::Failed(error)) => {
                return Err(FlowError::ActivityFailed {
                    activity_type: activity_type.to_string(),
                    source: error,
                });
            }
            Some(RecordedActivity::Scheduled { attempts, .. }) => {
                info!(
                    "Resuming activity {} (seq {}) after {} failed attempt(s)",
                    activity_type, seq, attempts
                );
                attempts + 1
            }
            None => {
                self.record(HistoryEvent::ActivityScheduled {
                    seq,
                    activity_type: activity_type.to_string(),
                    task_queue: task_queue.clone(),
                    input: input.clone(),
                })
                .await?;
                1
            }
        };

        loop {
            let info = ActivityInfo {
                activity_type: activity_type.to_string(),
                task_queue: task_queue.clone(),
                workflow_id: self.run.workflow_id.clone(),
                run_id: self.run.run_id,
                seq,
                attempt,
            };

            let outcome = self
                .service
                .dispatch_activity(info, input.clone(), options.start_to_close_timeout)
                .await;

            let error = match outcome {
                Ok(result) => {
                    self.record(HistoryEvent::ActivityCompleted {
                        seq,
                        result: result.clone(),
                    })
                    .await?;
                    return decode(result);
                }
                Err(error) => error,
            };

            match policy.next_backoff(attempt, &error) {
                Some(backoff) => {
                    warn!(
                        "Activity {} attempt {} failed: {}; retrying in {:?}",
                        activity_type, attempt, error, backoff
                    );
                    self.record(HistoryEvent::ActivityAttemptFailed {
                        seq,
                        attempt,
                        error,
                        backoff_ms: backoff.as_millis() as u64,
                    })
                    .await?;
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                None => {
                    error!(
                        "Activity {} failed after {} attempt(s): {}",
                        activity_type, attempt, error
                    );
                    self.record(HistoryEvent::ActivityFailed {
                        seq,
                        error: error.clone(),
                    })
                    .await?;
                    return Err(FlowError::ActivityFailed {
                        activity_type: activity_type.to_string(),
                        source: error,
                    });
                }
            }
        }
    }

    pub(crate) async fn mark_started(&mut self) -> FlowResult<()> {
        self.run.status = RunStatus::Running;
        if self.run.started_at.is_none() {
            self.run.started_at = Some(Utc::now());
        }
        let attempt = self.run.attempt;
        let already_started = self
            .run
            .history
            .iter()
            .any(|e| matches!(e, HistoryEvent::WorkflowStarted { .. }));
        if already_started {
            return self.service.persist(&self.run).await;
        }
        self.record(HistoryEvent::WorkflowStarted {
            attempt,
            at: Utc::now(),
        })
        .await
    }

    /// Record the run's outcome and hand it back.
    pub(crate) async fn finish(
        mut self,
        outcome: FlowResult<serde_json::Value>,
    ) -> FlowResult<serde_json::Value> {
        self.run.completed_at = Some(Utc::now());
        match &outcome {
            Ok(result) => {
                self.run.status = RunStatus::Completed;
                self.run.result = Some(result.clone());
                self.record(HistoryEvent::WorkflowCompleted {
                    result: result.clone(),
                })
                .await?;
            }
            Err(e) => {
                self.run.status = RunStatus::Failed;
                self.run.error = Some(e.to_string());
                self.record(HistoryEvent::WorkflowFailed {
                    error: e.to_string(),
                })
                .await?;
            }
        }
        outcome
    }
}

fn decode<O: DeserializeOwned>(value: serde_json::Value) -> FlowResult<O> {
    serde_json::from_value(value).map_err(|e| FlowError::Serialization(e.to_string()))
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("run_id", &self.run.run_id)
            .field("workflow_id", &self.run.workflow_id)
            .field("next_seq", &self.next_seq)
            .finish()
    }
}
