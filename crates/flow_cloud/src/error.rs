//! Error types for the cloud adapters.

use flow_core::ActivityError;
use thiserror::Error;

use crate::build::BuildStatus;

/// Result type alias for adapter operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while talking to build, storage or compute services.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("{service} API error {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Build {build_id} finished with status {status}")]
    BuildFailed { build_id: String, status: BuildStatus },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Command '{command}' failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    #[error("Docker {0}")]
    Docker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::DockerApi(_) | Self::Io(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::CommandFailed { .. } | Self::Docker(_) => true,
            Self::BuildFailed { .. }
            | Self::InvalidConfig(_)
            | Self::Archive(_)
            | Self::Json(_) => false,
        }
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<CloudError> for ActivityError {
    fn from(e: CloudError) -> Self {
        if e.is_retryable() {
            ActivityError::retryable(e.to_string())
        } else {
            ActivityError::non_retryable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_status_classification() {
        let unavailable = CloudError::Api {
            service: "Cloud Build",
            status: 503,
            message: "backend unavailable".to_string(),
        };
        let throttled = CloudError::Api {
            service: "Cloud Storage",
            status: 429,
            message: "rate limited".to_string(),
        };
        let forbidden = CloudError::Api {
            service: "Cloud Storage",
            status: 403,
            message: "permission denied".to_string(),
        };

        assert!(unavailable.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!forbidden.is_retryable());
    }

    #[test]
    fn test_terminal_build_status_is_not_retryable() {
        let err = CloudError::BuildFailed {
            build_id: "b-1".to_string(),
            status: BuildStatus::Failure,
        };
        let activity: ActivityError = err.into();
        assert!(!activity.is_retryable());
        assert!(activity.message.contains("b-1"));
        assert!(activity.message.contains("FAILURE"));
    }

    #[test]
    fn test_transport_error_maps_to_retryable() {
        let activity: ActivityError = CloudError::Transport("connection reset".to_string()).into();
        assert!(activity.is_retryable());
        assert!(!activity.is_timeout());
    }
}
