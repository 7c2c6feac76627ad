//! Error types for the workflow layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for workflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Result type alias for activity implementations.
pub type ActivityResult<T> = Result<T, ActivityError>;

/// Errors that can occur while connecting, scheduling or running workflows.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Workflow type not registered: {0}")]
    WorkflowNotRegistered(String),

    #[error("Workflow run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    #[error("Activity '{activity_type}' failed: {source}")]
    ActivityFailed {
        activity_type: String,
        #[source]
        source: ActivityError,
    },

    #[error("Workflow execution failed: {0}")]
    WorkflowExecutionFailed(String),

    #[error("Non-deterministic workflow: {0}")]
    NonDeterminism(String),

    #[error("Worker shut down: {0}")]
    WorkerShutdown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FlowError {
    /// Whether a failed run may be attempted again under a workflow retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::ActivityFailed { .. }
                | FlowError::WorkflowExecutionFailed(_)
                | FlowError::WorkerShutdown(_)
        )
    }

    /// Whether the run failed because an activity exceeded its start-to-close timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::ActivityFailed { source, .. } if source.is_timeout())
    }

    /// The activity failure behind this error, if any.
    pub fn activity_error(&self) -> Option<&ActivityError> {
        match self {
            FlowError::ActivityFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Classification of an activity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityErrorKind {
    /// Transient failure; the engine retries per the activity's retry policy.
    Retryable,
    /// Permanent failure; remaining attempts are skipped.
    NonRetryable,
    /// The attempt exceeded its start-to-close timeout.
    Timeout,
}

impl std::fmt::Display for ActivityErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::NonRetryable => write!(f, "non-retryable"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Failure reported by an activity attempt.
///
/// Recorded verbatim in run history, so it is plain data.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ActivityError {
    pub kind: ActivityErrorKind,
    pub message: String,
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ActivityErrorKind::Retryable,
            message: message.into(),
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            kind: ActivityErrorKind::NonRetryable,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ActivityErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != ActivityErrorKind::NonRetryable
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ActivityErrorKind::Timeout
    }
}
