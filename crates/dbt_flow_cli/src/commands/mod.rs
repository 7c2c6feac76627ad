//! CLI command definitions.
//!
//! Each subcommand maps to one bootstrap entry point of the pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dbt_flow::{bootstrap, Backend, FlowConfig, PipelineOptions};
use flow_core::{ExecutionService, WorkerHandle};

pub mod resume;
pub mod run;
pub mod stop;

/// dbt-flow - durable build, push and deploy pipeline for dbt projects
#[derive(Parser)]
#[command(name = "dbt-flow")]
#[command(version, about = "dbt-flow - durable build, push and deploy pipeline for dbt projects")]
#[command(long_about = r#"
dbt-flow packages a dbt project, builds a container image from it, pushes the
image, deploys it to a compute instance and hands over to a script worker.
Each step is retried on failure and the run survives restarts.

Both task queues (DBT-FLOW and DBT-FLOW-PYTHON) are served by workers inside
the run and resume commands.

COMMANDS:
  run     → Start workers and run the pipeline to completion
  resume  → Resume an interrupted run from recorded history
  stop    → Stop a deployed compute instance

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid configuration
  3 - Activity failure
  4 - Activity timeout
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a dbt-flow.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline and wait for the result
    Run(run::RunArgs),

    /// Resume an interrupted run
    Resume(resume::ResumeArgs),

    /// Stop a deployed instance
    Stop(stop::StopArgs),
}

/// Settings that override the config file.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Execution service target
    #[arg(long, env = "TEMPORAL_TARGET", global = true)]
    pub target: Option<String>,

    /// Execution service namespace
    #[arg(long, env = "TEMPORAL_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// GCP project id
    #[arg(long, env = "GCP_PROJECT_ID", global = true)]
    pub project: Option<String>,

    /// GCP OAuth access token
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// dbt project directory packaged as the build context
    #[arg(long, env = "DBT_FLOW_SOURCE_DIR", global = true)]
    pub source_dir: Option<PathBuf>,

    /// Directory for run history
    #[arg(long, env = "DBT_FLOW_HISTORY_DIR", global = true)]
    pub history_dir: Option<PathBuf>,

    /// Activity backend: cloud-build or docker
    #[arg(long, env = "DBT_FLOW_BACKEND", global = true)]
    pub backend: Option<Backend>,
}

impl SettingsArgs {
    /// Load the config file and apply overrides.
    pub fn resolve(&self, config_path: Option<&PathBuf>) -> Result<FlowConfig> {
        let mut config = FlowConfig::load(config_path.map(PathBuf::as_path))
            .context("Failed to load configuration")?;
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut FlowConfig) {
        if let Some(target) = &self.target {
            config.temporal.target = target.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.temporal.namespace = namespace.clone();
        }
        if let Some(project) = &self.project {
            config.gcp.project_id = project.clone();
        }
        if let Some(token) = &self.access_token {
            config.gcp.access_token = Some(token.clone());
        }
        if let Some(dir) = &self.source_dir {
            config.source_dir = dir.clone();
        }
        if let Some(dir) = &self.history_dir {
            config.temporal.history_dir = Some(dir.clone());
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
    }
}

/// Command run by the script worker for each script step.
#[derive(Args, Debug, Default)]
pub struct ScriptCommandArgs {
    /// Overrides `script.command` (pass after `--`)
    #[arg(last = true)]
    pub script_command: Vec<String>,
}

impl ScriptCommandArgs {
    pub fn apply(&self, config: &mut FlowConfig) {
        if !self.script_command.is_empty() {
            config.script.command = self.script_command.clone();
        }
    }
}

/// Start both task-queue workers in this process.
pub(crate) async fn start_workers(
    service: &ExecutionService,
    config: &FlowConfig,
) -> Result<Vec<WorkerHandle>> {
    let activities = bootstrap::docker_activities(config)
        .await
        .context("Failed to set up docker activities")?;
    Ok(vec![
        bootstrap::initiate_worker(service, activities, PipelineOptions::default()),
        bootstrap::initiate_script_worker(service, bootstrap::script_activities(config)),
    ])
}

pub(crate) async fn shutdown_all(workers: Vec<WorkerHandle>) -> Result<()> {
    for worker in workers {
        let queue = worker.task_queue().to_string();
        worker
            .shutdown()
            .await
            .with_context(|| format!("Worker on {} did not shut down cleanly", queue))?;
    }
    Ok(())
}
