//! Activities backed by the managed build service.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use flow_cloud::{
    create_with_container_args, package_directory, stop_instance_args, BlobStorage, BuildService,
    BuildSpec, BuildStep, StorageSource, ARCHIVE_CONTENT_TYPE,
};
use flow_core::ActivityResult;
use tracing::info;

use super::{image_name, image_repository, instance_name, DockerActivities};

/// Longest bucket name Cloud Storage accepts.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Runs build, push, deploy and stop as build-service jobs.
pub struct CloudBuildActivities {
    project_id: String,
    source_dir: PathBuf,
    builds: Arc<dyn BuildService>,
    storage: Arc<dyn BlobStorage>,
}

impl CloudBuildActivities {
    pub fn new(
        project_id: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        builds: Arc<dyn BuildService>,
        storage: Arc<dyn BlobStorage>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            source_dir: source_dir.into(),
            builds,
            storage,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Bucket staging the sources of one image.
    ///
    /// `<project>_<image_id>`, with the project id cut short so the name stays
    /// within the bucket name limit. The image id keeps it unique.
    pub fn bucket_name(&self, image_id: &str) -> String {
        let room = MAX_BUCKET_NAME_LEN.saturating_sub(image_id.len() + 1);
        let prefix: String = self.project_id.chars().take(room).collect();
        let prefix = prefix.trim_end_matches(['-', '_']);
        if prefix.is_empty() {
            return image_id.to_string();
        }
        format!("{}_{}", prefix, image_id)
    }

    /// Object holding the packaged sources of one image.
    pub fn object_name(image_id: &str) -> String {
        format!("zipfile_{}.tar.gz", image_id)
    }
}

#[async_trait]
impl DockerActivities for CloudBuildActivities {
    async fn build_docker_image(&self, script_id: String) -> ActivityResult<String> {
        let image_id = image_name(&script_id);
        let repository = image_repository(&self.project_id, &image_id);
        let bucket = self.bucket_name(&image_id);
        let object = Self::object_name(&image_id);

        let artifact = package_directory(&self.source_dir).await?;
        info!(
            "Packaged {} ({} files, {} bytes) for {}",
            self.source_dir.display(),
            artifact.file_count(),
            artifact.len(),
            image_id
        );

        self.storage.ensure_bucket(&bucket).await?;
        self.storage
            .upload_object(&bucket, &object, ARCHIVE_CONTENT_TYPE, artifact.into_bytes())
            .await?;

        let spec = BuildSpec::new()
            .source(StorageSource::new(bucket, object))
            .step(BuildStep::docker(["build", "-t", repository.as_str(), "."]));
        let outcome = self.builds.submit_and_wait(&spec).await?;

        info!("Built {} (build {})", repository, outcome.build_id);
        Ok(repository)
    }

    async fn upload_docker_image(&self, image: String) -> ActivityResult<String> {
        let spec = BuildSpec::new().step(BuildStep::docker(["push", image.as_str()]));
        let outcome = self.builds.submit_and_wait(&spec).await?;
        info!("Pushed {} (build {})", image, outcome.build_id);
        Ok(image)
    }

    async fn deploy_docker_image(
        &self,
        container_image: String,
        script_id: String,
    ) -> ActivityResult<String> {
        let instance = instance_name(&script_id);
        let spec = BuildSpec::new().step(BuildStep::gcloud(create_with_container_args(
            &instance,
            &container_image,
        )));
        let outcome = self.builds.submit_and_wait(&spec).await?;
        info!(
            "Deployed {} on instance {} (build {})",
            container_image, instance, outcome.build_id
        );
        Ok(instance)
    }

    async fn stop_compute_instance(&self, instance_name: String) -> ActivityResult<()> {
        let spec = BuildSpec::new().step(BuildStep::gcloud(stop_instance_args(&instance_name)));
        let outcome = self.builds.submit_and_wait(&spec).await?;
        info!("Stopped instance {} (build {})", instance_name, outcome.build_id);
        Ok(())
    }
}
