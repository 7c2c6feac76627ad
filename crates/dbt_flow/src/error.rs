//! Error types for the pipeline.

use std::path::PathBuf;

use flow_cloud::CloudError;
use flow_core::FlowError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while configuring, starting or running the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Workflow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the failure came from an activity exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Flow(e) if e.is_timeout())
    }
}
