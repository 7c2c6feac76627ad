//! The build → push → deploy → script workflow.

use std::time::Duration;

use async_trait::async_trait;
use flow_core::{ActivityOptions, FlowResult, RetryPolicy, Workflow, WorkflowContext};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activities::script::{ScriptRequest, RUN_SCRIPT};
use crate::activities::{
    DeployRequest, BUILD_DOCKER_IMAGE, DEPLOY_DOCKER_IMAGE, UPLOAD_DOCKER_IMAGE,
};

/// Workflow type name.
pub const WORKFLOW_TYPE: &str = "DockerBuildAndDeployWorkflow";

/// Task queue served by the script worker.
pub const SCRIPT_TASK_QUEUE: &str = "DBT-FLOW-PYTHON";

/// Timeouts and retry policies of each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Options for build, push and deploy
    pub docker: ActivityOptions,
    /// Options for the script step
    pub script: ActivityOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            docker: ActivityOptions::new(Duration::from_secs(60 * 60)),
            script: ActivityOptions::new(Duration::from_secs(1000))
                .task_queue(SCRIPT_TASK_QUEUE)
                .retry_policy(
                    RetryPolicy::new()
                        .initial_interval(Duration::from_secs(30))
                        .maximum_attempts(5),
                ),
        }
    }
}

impl PipelineOptions {
    pub fn docker(mut self, options: ActivityOptions) -> Self {
        self.docker = options;
        self
    }

    pub fn script(mut self, options: ActivityOptions) -> Self {
        self.script = options;
        self
    }
}

/// What a successful run reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub script_id: String,
    pub image: String,
    pub instance_name: String,
    pub script_output: String,
}

/// Builds the project image, pushes it, deploys it, then hands over to the
/// script worker.
#[derive(Debug, Clone, Default)]
pub struct DockerBuildAndDeployWorkflow {
    options: PipelineOptions,
}

impl DockerBuildAndDeployWorkflow {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    async fn execute(&self, ctx: &mut WorkflowContext) -> FlowResult<DeploymentResult> {
        let script_id = ctx.random_uuid().await?.to_string();
        info!("Run {} uses script id {}", ctx.run_id(), script_id);

        let image_id: String = ctx
            .execute_activity(BUILD_DOCKER_IMAGE, &script_id, &self.options.docker)
            .await?;

        let image: String = ctx
            .execute_activity(UPLOAD_DOCKER_IMAGE, &image_id, &self.options.docker)
            .await?;

        let deploy = DeployRequest {
            container_image: image.clone(),
            script_id: script_id.clone(),
        };
        let instance_name: String = ctx
            .execute_activity(DEPLOY_DOCKER_IMAGE, &deploy, &self.options.docker)
            .await?;

        let request = ScriptRequest {
            script_id: script_id.clone(),
            instance_name: instance_name.clone(),
            container_image: image.clone(),
        };
        let script_output: String = ctx
            .execute_activity(RUN_SCRIPT, &request, &self.options.script)
            .await?;

        Ok(DeploymentResult {
            script_id,
            image,
            instance_name,
            script_output,
        })
    }
}

#[async_trait]
impl Workflow for DockerBuildAndDeployWorkflow {
    fn workflow_type(&self) -> &str {
        WORKFLOW_TYPE
    }

    async fn run(&self, ctx: &mut WorkflowContext) -> FlowResult<serde_json::Value> {
        let result = self.execute(ctx).await?;
        serde_json::to_value(result).map_err(|e| flow_core::FlowError::Serialization(e.to_string()))
    }
}
