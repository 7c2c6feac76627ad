//! Local `gcloud` CLI wrapper for compute operations.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::compute::{create_with_container_args, stop_instance_args};
use crate::error::{CloudError, CloudResult};

/// Compute instance operations.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn create_with_container(&self, instance: &str, image: &str) -> CloudResult<()>;

    async fn stop_instance(&self, instance: &str) -> CloudResult<()>;
}

/// Runs compute commands through a local `gcloud` binary.
#[derive(Debug, Clone)]
pub struct GcloudCli {
    binary: String,
    project: Option<String>,
}

impl Default for GcloudCli {
    fn default() -> Self {
        Self {
            binary: "gcloud".to_string(),
            project: None,
        }
    }
}

impl GcloudCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    fn full_args(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(project) = &self.project {
            args.push(format!("--project={}", project));
        }
        args.push("--quiet".to_string());
        args
    }

    /// Run `gcloud` with the given arguments and return its stdout.
    pub async fn run(&self, args: Vec<String>) -> CloudResult<String> {
        let args = self.full_args(args);
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Executing: {}", command);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CloudError::CommandFailed {
                command: command.clone(),
                exit_code: -1,
                stderr: format!("failed to spawn: {}", e),
            })?;

        if !output.status.success() {
            return Err(CloudError::CommandFailed {
                command,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ComputeClient for GcloudCli {
    async fn create_with_container(&self, instance: &str, image: &str) -> CloudResult<()> {
        self.run(create_with_container_args(instance, image)).await?;
        info!("Created instance {} running {}", instance, image);
        Ok(())
    }

    async fn stop_instance(&self, instance: &str) -> CloudResult<()> {
        self.run(stop_instance_args(instance)).await?;
        info!("Stopped instance {}", instance);
        Ok(())
    }
}
