//! The script step served on the script task queue.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use flow_core::{ActivityContext, ActivityError, ActivityRegistry, ActivityResult, FnActivity};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

/// Activity type name of the script step.
pub const RUN_SCRIPT: &str = "FalScriptActivities::run_script";

/// Input of the script step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub script_id: String,
    pub instance_name: String,
    pub container_image: String,
}

/// Runs a configured command for each deployed script.
///
/// The command receives the run's identifiers as `DBT_FLOW_*` environment
/// variables; its trimmed stdout is the activity result. Without a command
/// the step only acknowledges the deployment.
#[derive(Debug, Clone, Default)]
pub struct ScriptActivities {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ScriptActivities {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            working_dir: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub async fn run_script(&self, ctx: &ActivityContext, request: ScriptRequest) -> ActivityResult<String> {
        let Some((program, args)) = self.command.split_first() else {
            info!("Script {} acknowledged on {}", request.script_id, request.instance_name);
            return Ok(format!(
                "script {} ready on {}",
                request.script_id, request.instance_name
            ));
        };

        debug!("Running script command {:?} (attempt {})", self.command, ctx.attempt());
        let mut command = Command::new(program);
        command
            .args(args)
            .env("DBT_FLOW_SCRIPT_ID", &request.script_id)
            .env("DBT_FLOW_INSTANCE", &request.instance_name)
            .env("DBT_FLOW_IMAGE", &request.container_image)
            .env("DBT_FLOW_ATTEMPT", ctx.attempt().to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            ActivityError::non_retryable(format!("failed to start '{}': {}", program, e))
        })?;

        if !output.status.success() {
            return Err(ActivityError::retryable(format!(
                "script exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("Script {} finished: {}", request.script_id, stdout);
        Ok(stdout)
    }

    /// Register the script step.
    pub fn registry(self: Arc<Self>) -> ActivityRegistry {
        let mut registry = ActivityRegistry::new();
        registry.register(Arc::new(FnActivity::typed(
            RUN_SCRIPT,
            move |ctx, request: ScriptRequest| {
                let script = Arc::clone(&self);
                async move { script.run_script(&ctx, request).await }
            },
        )));
        registry
    }
}
