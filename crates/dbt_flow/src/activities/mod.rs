//! Build, push, deploy and stop activities.
//!
//! `DockerActivities` is the capability set the workflow calls. Two
//! implementations exist: [`CloudBuildActivities`] runs every step as a
//! managed build job, [`LocalDockerActivities`] uses a local Docker daemon
//! and the `gcloud` CLI. The choice is made when the worker registers them.

use std::sync::Arc;

use async_trait::async_trait;
use flow_core::{ActivityRegistry, ActivityResult, FnActivity};
use serde::{Deserialize, Serialize};

pub mod cloud_build;
pub mod local;
pub mod script;

pub use cloud_build::CloudBuildActivities;
pub use local::LocalDockerActivities;
pub use script::{ScriptActivities, ScriptRequest, RUN_SCRIPT};

/// Activity type names as registered on the pipeline task queue.
pub const BUILD_DOCKER_IMAGE: &str = "buildDockerImage";
pub const UPLOAD_DOCKER_IMAGE: &str = "uploadDockerImage";
pub const DEPLOY_DOCKER_IMAGE: &str = "deployDockerImage";
pub const STOP_COMPUTE_INSTANCE: &str = "stopComputeInstance";

/// Prefix shared by image and instance names.
pub const NAME_PREFIX: &str = "dbt-flow-";

/// Registry host images are published under.
pub const REGISTRY_HOST: &str = "gcr.io";

/// Image name for a run.
pub fn image_name(script_id: &str) -> String {
    format!("{}{}", NAME_PREFIX, script_id)
}

/// Compute instance name for a run.
pub fn instance_name(script_id: &str) -> String {
    format!("{}{}", NAME_PREFIX, script_id)
}

/// `gcr.io/<project>/<image>`
pub fn image_repository(project_id: &str, image_name: &str) -> String {
    format!("{}/{}/{}", REGISTRY_HOST, project_id, image_name)
}

/// Input of the deploy activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub container_image: String,
    pub script_id: String,
}

/// The pipeline's side effects.
///
/// Every call submits remote work and blocks until it completes. Methods are
/// idempotent for a given script id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DockerActivities: Send + Sync {
    /// Package the source tree, build it remotely, return the image reference.
    async fn build_docker_image(&self, script_id: String) -> ActivityResult<String>;

    /// Push an image to its registry and return the same reference.
    async fn upload_docker_image(&self, image: String) -> ActivityResult<String>;

    /// Start an instance running the image, return the instance name.
    async fn deploy_docker_image(
        &self,
        container_image: String,
        script_id: String,
    ) -> ActivityResult<String>;

    /// Halt an instance.
    async fn stop_compute_instance(&self, instance_name: String) -> ActivityResult<()>;
}

/// Wrap a `DockerActivities` implementation as engine activities.
pub fn activity_registry(activities: Arc<dyn DockerActivities>) -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();

    let build = Arc::clone(&activities);
    registry.register(Arc::new(FnActivity::typed(
        BUILD_DOCKER_IMAGE,
        move |_ctx, script_id: String| {
            let build = Arc::clone(&build);
            async move { build.build_docker_image(script_id).await }
        },
    )));

    let upload = Arc::clone(&activities);
    registry.register(Arc::new(FnActivity::typed(
        UPLOAD_DOCKER_IMAGE,
        move |_ctx, image: String| {
            let upload = Arc::clone(&upload);
            async move { upload.upload_docker_image(image).await }
        },
    )));

    let deploy = Arc::clone(&activities);
    registry.register(Arc::new(FnActivity::typed(
        DEPLOY_DOCKER_IMAGE,
        move |_ctx, request: DeployRequest| {
            let deploy = Arc::clone(&deploy);
            async move {
                deploy
                    .deploy_docker_image(request.container_image, request.script_id)
                    .await
            }
        },
    )));

    let stop = activities;
    registry.register(Arc::new(FnActivity::typed(
        STOP_COMPUTE_INSTANCE,
        move |_ctx, instance: String| {
            let stop = Arc::clone(&stop);
            async move { stop.stop_compute_instance(instance).await }
        },
    )));

    registry
}
