//! Activities backed by a local Docker daemon and the `gcloud` CLI.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use flow_cloud::{package_directory, ComputeClient, ImageClient};
use flow_core::ActivityResult;
use tracing::info;

use super::{image_name, image_repository, instance_name, DockerActivities};

/// Builds and pushes locally, provisions through `gcloud`.
pub struct LocalDockerActivities {
    project_id: String,
    source_dir: PathBuf,
    images: Arc<dyn ImageClient>,
    compute: Arc<dyn ComputeClient>,
}

impl LocalDockerActivities {
    pub fn new(
        project_id: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        images: Arc<dyn ImageClient>,
        compute: Arc<dyn ComputeClient>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            source_dir: source_dir.into(),
            images,
            compute,
        }
    }
}

#[async_trait]
impl DockerActivities for LocalDockerActivities {
    async fn build_docker_image(&self, script_id: String) -> ActivityResult<String> {
        let image_id = image_name(&script_id);
        let repository = image_repository(&self.project_id, &image_id);

        let context = package_directory(&self.source_dir).await?;
        let local_tag = self.images.build_image(context, &image_id).await?;
        self.images.tag_image(&local_tag, &repository).await?;

        info!("Built {} locally as {}", repository, local_tag);
        Ok(repository)
    }

    async fn upload_docker_image(&self, image: String) -> ActivityResult<String> {
        self.images.push_image(&image).await?;
        info!("Pushed {}", image);
        Ok(image)
    }

    async fn deploy_docker_image(
        &self,
        container_image: String,
        script_id: String,
    ) -> ActivityResult<String> {
        let instance = instance_name(&script_id);
        self.compute
            .create_with_container(&instance, &container_image)
            .await?;
        Ok(instance)
    }

    async fn stop_compute_instance(&self, instance_name: String) -> ActivityResult<()> {
        self.compute.stop_instance(&instance_name).await?;
        Ok(())
    }
}
