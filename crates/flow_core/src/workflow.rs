//! Workflow definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::WorkflowContext;
use crate::error::FlowResult;

/// Lifecycle state of a workflow run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Submitted, not yet picked up by a worker
    #[default]
    Pending,
    /// A worker is executing (or replaying) the run
    Running,
    /// Completed successfully
    Completed,
    /// Failed; may be followed by another attempt under the workflow retry policy
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Trait for workflow implementations.
///
/// `run` may be replayed from recorded history after a crash, so it must be
/// deterministic: no wall-clock time, randomness or I/O except through the
/// context's primitives (`random_uuid`, `execute_activity`).
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Workflow type name used to route runs to this implementation.
    fn workflow_type(&self) -> &str;

    /// Run the workflow to completion.
    async fn run(&self, ctx: &mut WorkflowContext) -> FlowResult<serde_json::Value>;
}
