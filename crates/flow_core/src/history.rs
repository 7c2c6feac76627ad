//! Run history with persistence and replay support.
//!
//! Every command a workflow issues is appended to its run's history and the
//! run is saved after each event. A run loaded back from the store can be
//! replayed: completed commands return their recorded results.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ActivityError, FlowError, FlowResult};
use crate::options::RetryPolicy;
use crate::workflow::RunStatus;

/// A single history event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    WorkflowStarted {
        attempt: u32,
        at: DateTime<Utc>,
    },
    SideEffectRecorded {
        seq: u64,
        value: serde_json::Value,
    },
    ActivityScheduled {
        seq: u64,
        activity_type: String,
        task_queue: String,
        input: serde_json::Value,
    },
    ActivityAttemptFailed {
        seq: u64,
        attempt: u32,
        error: ActivityError,
        backoff_ms: u64,
    },
    ActivityCompleted {
        seq: u64,
        result: serde_json::Value,
    },
    ActivityFailed {
        seq: u64,
        error: ActivityError,
    },
    WorkflowCompleted {
        result: serde_json::Value,
    },
    WorkflowFailed {
        error: String,
    },
}

impl HistoryEvent {
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::SideEffectRecorded { seq, .. }
            | Self::ActivityScheduled { seq, .. }
            | Self::ActivityAttemptFailed { seq, .. }
            | Self::ActivityCompleted { seq, .. }
            | Self::ActivityFailed { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}

/// Recorded outcome of an activity call, as seen during replay.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedActivity {
    /// Scheduled but unfinished; `attempts` attempts already failed
    Scheduled { activity_type: String, attempts: u32 },
    Completed(serde_json::Value),
    Failed(ActivityError),
}

/// Kind of command recorded at a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedCommand<'a> {
    SideEffect,
    Activity(&'a str),
}

impl std::fmt::Display for RecordedCommand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SideEffect => write!(f, "side effect"),
            Self::Activity(activity_type) => write!(f, "activity '{}'", activity_type),
        }
    }
}

/// A workflow run and its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    /// Business identifier shared by all attempts of the workflow
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub namespace: String,
    /// 1-based workflow-level attempt
    pub attempt: u32,
    pub retry_policy: Option<RetryPolicy>,
    pub status: RunStatus,
    pub history: Vec<HistoryEvent>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl WorkflowRun {
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_type: impl Into<String>,
        task_queue: impl Into<String>,
        namespace: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            workflow_type: workflow_type.into(),
            task_queue: task_queue.into(),
            namespace: namespace.into(),
            attempt,
            retry_policy: None,
            status: RunStatus::Pending,
            history: Vec::new(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: Option<RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// The next attempt of this workflow, starting from an empty history.
    pub fn next_attempt(&self) -> Self {
        Self::new(
            &self.workflow_id,
            &self.workflow_type,
            &self.task_queue,
            &self.namespace,
            self.attempt + 1,
        )
        .with_retry_policy(self.retry_policy.clone())
    }

    pub fn record(&mut self, event: HistoryEvent) {
        self.history.push(event);
    }

    pub fn side_effect(&self, seq: u64) -> Option<&serde_json::Value> {
        self.history.iter().find_map(|e| match e {
            HistoryEvent::SideEffectRecorded { seq: s, value } if *s == seq => Some(value),
            _ => None,
        })
    }

    /// The command first recorded at `seq`, if any.
    pub fn recorded_command(&self, seq: u64) -> Option<RecordedCommand<'_>> {
        self.history.iter().find_map(|e| match e {
            HistoryEvent::SideEffectRecorded { seq: s, .. } if *s == seq => {
                Some(RecordedCommand::SideEffect)
            }
            HistoryEvent::ActivityScheduled {
                seq: s,
                activity_type,
                ..
            } if *s == seq => Some(RecordedCommand::Activity(activity_type)),
            _ => None,
        })
    }

    /// Look up what happened to the activity call at `seq`.
    pub fn activity(&self, seq: u64) -> Option<RecordedActivity> {
        let mut scheduled = None;
        let mut attempts = 0;
        for event in self.history.iter().filter(|e| e.seq() == Some(seq)) {
            match event {
                HistoryEvent::ActivityScheduled { activity_type, .. } => {
                    scheduled = Some(activity_type.clone())
                }
                HistoryEvent::ActivityAttemptFailed { .. } => attempts += 1,
                HistoryEvent::ActivityCompleted { result, .. } => {
                    return Some(RecordedActivity::Completed(result.clone()))
                }
                HistoryEvent::ActivityFailed { error, .. } => {
                    return Some(RecordedActivity::Failed(error.clone()))
                }
                _ => {}
            }
        }
        scheduled.map(|activity_type| RecordedActivity::Scheduled {
            activity_type,
            attempts,
        })
    }

    /// Backoff delays recorded for the activity call at `seq`, in order.
    pub fn backoffs(&self, seq: u64) -> Vec<u64> {
        self.history
            .iter()
            .filter_map(|e| match e {
                HistoryEvent::ActivityAttemptFailed { seq: s, backoff_ms, .. } if *s == seq => {
                    Some(*backoff_ms)
                }
                _ => None,
            })
            .collect()
    }

    /// Whether the run can be picked up again by a worker.
    pub fn can_resume(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Persistent storage for workflow runs.
pub trait HistoryStore: Send + Sync {
    fn save(&self, run: &WorkflowRun) -> FlowResult<()>;

    fn load(&self, run_id: Uuid) -> FlowResult<WorkflowRun>;

    /// All stored runs for a workflow id, ordered by attempt.
    fn runs_for(&self, workflow_id: &str) -> FlowResult<Vec<WorkflowRun>>;
}

/// Stores each run as `<dir>/<run_id>.json`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }
}

impl HistoryStore for FileHistoryStore {
    fn save(&self, run: &WorkflowRun) -> FlowResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.run_path(run.run_id);
        let json = serde_json::to_string_pretty(run)
            .map_err(|e| FlowError::Serialization(e.to_string()))?;
        // Write-then-rename so a crash never leaves a truncated history.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved run history to {:?}", path);
        Ok(())
    }

    fn load(&self, run_id: Uuid) -> FlowResult<WorkflowRun> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Err(FlowError::RunNotFound(run_id));
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| FlowError::Serialization(e.to_string()))
    }

    fn runs_for(&self, workflow_id: &str) -> FlowResult<Vec<WorkflowRun>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let run: WorkflowRun = serde_json::from_str(&content)
                .map_err(|e| FlowError::Serialization(e.to_string()))?;
            if run.workflow_id == workflow_id {
                runs.push(run);
            }
        }
        runs.sort_by_key(|r| r.attempt);
        Ok(runs)
    }
}

/// In-memory store, used when no history directory is configured.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn save(&self, run: &WorkflowRun) -> FlowResult<()> {
        self.runs.write().insert(run.run_id, run.clone());
        Ok(())
    }

    fn load(&self, run_id: Uuid) -> FlowResult<WorkflowRun> {
        self.runs
            .read()
            .get(&run_id)
            .cloned()
            .ok_or(FlowError::RunNotFound(run_id))
    }

    fn runs_for(&self, workflow_id: &str) -> FlowResult<Vec<WorkflowRun>> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .read()
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.attempt);
        Ok(runs)
    }
}
