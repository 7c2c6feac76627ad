//! Remote build jobs: what gets submitted and what comes back.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CloudResult;

/// Builder image running the container-build tool.
pub const DOCKER_BUILDER: &str = "gcr.io/cloud-builders/docker";

/// Builder image running the cloud CLI.
pub const GCLOUD_BUILDER: &str = "gcr.io/cloud-builders/gcloud";

/// Uploaded source for a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSource {
    pub bucket: String,
    pub object: String,
}

impl StorageSource {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

/// One step of a build: a builder image and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub name: String,
    pub args: Vec<String>,
}

impl BuildStep {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn docker<S: Into<String>>(args: impl IntoIterator<Item = S>) -> Self {
        Self::new(DOCKER_BUILDER, args.into_iter().map(Into::into).collect())
    }

    pub fn gcloud<S: Into<String>>(args: impl IntoIterator<Item = S>) -> Self {
        Self::new(GCLOUD_BUILDER, args.into_iter().map(Into::into).collect())
    }
}

/// A build job: optional uploaded source plus ordered steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub source: Option<StorageSource>,
    pub steps: Vec<BuildStep>,
}

impl BuildSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: StorageSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn step(mut self, step: BuildStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Build status as reported by the build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::StatusUnknown | Self::Pending | Self::Queued | Self::Working
        )
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

/// Final state of a submitted build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub build_id: String,
    pub status: BuildStatus,
    pub log_url: Option<String>,
}

/// A service that runs build jobs.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Submit a build and wait for it to reach a terminal status.
    ///
    /// Returns `Err(CloudError::BuildFailed)` unless the build succeeded.
    async fn submit_and_wait(&self, spec: &BuildSpec) -> CloudResult<BuildOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!BuildStatus::Queued.is_terminal());
        assert!(!BuildStatus::Working.is_terminal());
        assert!(BuildStatus::Success.is_terminal());
        assert!(BuildStatus::Timeout.is_terminal());
        assert!(BuildStatus::Success.is_success());
        assert!(!BuildStatus::Cancelled.is_success());
    }

    #[test]
    fn test_status_wire_format() {
        let status: BuildStatus = serde_json::from_str("\"INTERNAL_ERROR\"").unwrap();
        assert_eq!(status, BuildStatus::InternalError);
        assert_eq!(status.to_string(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_spec_builder() {
        let spec = BuildSpec::new()
            .source(StorageSource::new("bucket", "object.tar.gz"))
            .step(BuildStep::docker(["push", "gcr.io/p1/img"]));

        assert_eq!(spec.source.as_ref().unwrap().bucket, "bucket");
        assert_eq!(spec.steps[0].name, DOCKER_BUILDER);
        assert_eq!(spec.steps[0].args, vec!["push", "gcr.io/p1/img"]);
    }
}
