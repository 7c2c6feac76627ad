//! Google Cloud Build REST client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::build::{BuildOutcome, BuildService, BuildSpec, BuildStatus, BuildStep, StorageSource};
use crate::error::{CloudError, CloudResult};
use crate::gcp::{api_error, GcpCredentials};

/// Public Cloud Build endpoint.
pub const CLOUD_BUILD_ENDPOINT: &str = "https://cloudbuild.googleapis.com";

const SERVICE: &str = "Cloud Build";

/// Consecutive failed status polls tolerated before giving up.
const MAX_POLL_FAILURES: u32 = 3;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Submits builds to Cloud Build and polls them to completion.
pub struct CloudBuildClient {
    client: reqwest::Client,
    credentials: GcpCredentials,
    endpoint: String,
}

impl CloudBuildClient {
    pub fn new(credentials: GcpCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            endpoint: CLOUD_BUILD_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn builds_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/builds",
            self.endpoint,
            self.credentials.project_id()
        )
    }

    /// Submit a build and return its id.
    pub async fn submit(&self, spec: &BuildSpec) -> CloudResult<String> {
        let request = BuildRequest::from(spec);
        let response = self
            .client
            .post(self.builds_url())
            .bearer_auth(self.credentials.access_token())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let operation: Operation = response.json().await?;
        let build_id = operation.build_id().ok_or_else(|| {
            CloudError::Transport(format!(
                "operation {} carries no build metadata",
                operation.name
            ))
        })?;
        info!("Submitted build {} ({} step(s))", build_id, spec.steps.len());
        Ok(build_id)
    }

    /// Fetch a build's current state.
    pub async fn get_build(&self, build_id: &str) -> CloudResult<BuildOutcome> {
        let response = self
            .client
            .get(format!("{}/{}", self.builds_url(), build_id))
            .bearer_auth(self.credentials.access_token())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        let build: BuildResource = response.json().await?;
        Ok(build.into_outcome(build_id))
    }

    /// Poll a build until it reaches a terminal status.
    pub async fn wait(&self, build_id: &str) -> CloudResult<BuildOutcome> {
        let mut failures = 0;
        loop {
            match self.get_build(build_id).await {
                Ok(outcome) if outcome.status.is_terminal() => return Ok(outcome),
                Ok(outcome) => {
                    failures = 0;
                    debug!("Build {} is {}", build_id, outcome.status);
                }
                Err(e) if e.is_retryable() && failures + 1 < MAX_POLL_FAILURES => {
                    failures += 1;
                    warn!("Polling build {} failed ({}): {}", build_id, failures, e);
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BuildService for CloudBuildClient {
    async fn submit_and_wait(&self, spec: &BuildSpec) -> CloudResult<BuildOutcome> {
        let build_id = self.submit(spec).await?;
        let outcome = self.wait(&build_id).await?;
        if !outcome.status.is_success() {
            return Err(CloudError::BuildFailed {
                build_id: outcome.build_id,
                status: outcome.status,
            });
        }
        info!("Build {} succeeded", outcome.build_id);
        Ok(outcome)
    }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SourceRequest<'a>>,
    steps: &'a [BuildStep],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceRequest<'a> {
    storage_source: &'a StorageSource,
}

impl<'a> From<&'a BuildSpec> for BuildRequest<'a> {
    fn from(spec: &'a BuildSpec) -> Self {
        Self {
            source: spec
                .source
                .as_ref()
                .map(|storage_source| SourceRequest { storage_source }),
            steps: &spec.steps,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
}

impl Operation {
    fn build_id(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.build.as_ref())
            .and_then(|b| b.id.clone())
    }
}

#[derive(Debug, Deserialize)]
struct OperationMetadata {
    build: Option<BuildResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildResource {
    id: Option<String>,
    status: Option<BuildStatus>,
    log_url: Option<String>,
}

impl BuildResource {
    fn into_outcome(self, build_id: &str) -> BuildOutcome {
        BuildOutcome {
            build_id: self.id.unwrap_or_else(|| build_id.to_string()),
            status: self.status.unwrap_or(BuildStatus::StatusUnknown),
            log_url: self.log_url,
        }
    }
}
