//! Wiring: connect, start workers, submit runs.

use std::sync::Arc;

use flow_cloud::{CloudBuildClient, DockerClient, GcloudCli, GcpCredentials, GcsStorage};
use flow_core::{
    ExecutionService, RetryPolicy, Worker, WorkerHandle, WorkflowClient, WorkflowHandle,
    WorkflowOptions,
};
use tracing::info;
use uuid::Uuid;

use crate::activities::{
    activity_registry, CloudBuildActivities, DockerActivities, LocalDockerActivities,
    ScriptActivities,
};
use crate::config::{Backend, FlowConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::workflow::{
    DeploymentResult, DockerBuildAndDeployWorkflow, PipelineOptions, SCRIPT_TASK_QUEUE,
    WORKFLOW_TYPE,
};

/// Task queue serving the workflow and the build/push/deploy/stop activities.
pub const TASK_QUEUE: &str = "DBT-FLOW";

/// Attempts of a whole run before it is reported failed.
pub const WORKFLOW_ATTEMPTS: u32 = 3;

/// Connect to the execution service named in the configuration.
pub fn connect(config: &FlowConfig) -> PipelineResult<ExecutionService> {
    Ok(ExecutionService::connect(config.service_config())?)
}

/// Build the activity implementation selected by `config.backend`.
pub async fn docker_activities(config: &FlowConfig) -> PipelineResult<Arc<dyn DockerActivities>> {
    config.validate()?;
    let project_id = config.gcp.project_id.clone();

    match config.backend {
        Backend::CloudBuild => {
            let token = config.gcp.access_token.clone().ok_or_else(|| {
                PipelineError::InvalidConfig("missing GCP access token".to_string())
            })?;
            let credentials = GcpCredentials::new(&project_id, token)?;
            Ok(Arc::new(CloudBuildActivities::new(
                project_id,
                &config.source_dir,
                Arc::new(CloudBuildClient::new(credentials.clone())),
                Arc::new(GcsStorage::new(credentials)),
            )))
        }
        Backend::Docker => {
            let mut images = DockerClient::connect().await?;
            if let Some(token) = &config.gcp.access_token {
                images = images.with_registry_token(token);
            }
            let compute = GcloudCli::new().project(&project_id);
            Ok(Arc::new(LocalDockerActivities::new(
                project_id,
                &config.source_dir,
                Arc::new(images),
                Arc::new(compute),
            )))
        }
    }
}

/// Script step implementation from configuration.
pub fn script_activities(config: &FlowConfig) -> ScriptActivities {
    let script = ScriptActivities::new(config.script.command.clone());
    match &config.script.working_dir {
        Some(dir) => script.working_dir(dir),
        None => script,
    }
}

/// Register the workflow and the docker activities on `DBT-FLOW` and start polling.
pub fn initiate_worker(
    service: &ExecutionService,
    activities: Arc<dyn DockerActivities>,
    options: PipelineOptions,
) -> WorkerHandle {
    let mut worker = Worker::new(service.clone(), TASK_QUEUE);
    worker
        .register_workflow(Arc::new(DockerBuildAndDeployWorkflow::new(options)))
        .register_activities(&activity_registry(activities));
    worker.start()
}

/// Register the script step on `DBT-FLOW-PYTHON` and start polling.
pub fn initiate_script_worker(service: &ExecutionService, script: ScriptActivities) -> WorkerHandle {
    let mut worker = Worker::new(service.clone(), SCRIPT_TASK_QUEUE);
    worker.register_activities(&Arc::new(script).registry());
    worker.start()
}

/// Submission options: pipeline queue, whole-run retry.
pub fn workflow_options() -> WorkflowOptions {
    WorkflowOptions::new(TASK_QUEUE)
        .retry_policy(RetryPolicy::new().maximum_attempts(WORKFLOW_ATTEMPTS))
}

/// Submit a run and return its handle.
pub async fn start_dbt_flow(service: &ExecutionService) -> PipelineResult<WorkflowHandle> {
    let client = WorkflowClient::new(service.clone());
    let handle = client.start(WORKFLOW_TYPE, workflow_options()).await?;
    info!(
        "Started {} ({}) run {}",
        WORKFLOW_TYPE,
        handle.workflow_id(),
        handle.run_id()
    );
    Ok(handle)
}

/// Submit a run and block until it finishes.
pub async fn run_dbt_flow(service: &ExecutionService) -> PipelineResult<DeploymentResult> {
    let result: DeploymentResult = start_dbt_flow(service).await?.result().await?;
    info!(
        "Deployed script {} on instance {}",
        result.script_id, result.instance_name
    );
    Ok(result)
}

/// Resume an interrupted run from its recorded history.
pub async fn resume_dbt_flow(
    service: &ExecutionService,
    run_id: Uuid,
) -> PipelineResult<DeploymentResult> {
    let client = WorkflowClient::new(service.clone());
    Ok(client.resume(run_id).await?.result().await?)
}
