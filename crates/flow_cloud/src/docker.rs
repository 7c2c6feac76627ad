//! Local Docker daemon client for building and pushing images.

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::image::{BuildImageOptions, PushImageOptions, TagImageOptions};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::archive::BuildArtifact;
use crate::error::{CloudError, CloudResult};

/// Username the container registry expects alongside an OAuth access token.
pub const OAUTH_REGISTRY_USER: &str = "oauth2accesstoken";

/// Image operations on a container daemon.
#[async_trait]
pub trait ImageClient: Send + Sync {
    /// Build an image from a packaged context and tag it `tag`.
    async fn build_image(&self, context: BuildArtifact, tag: &str) -> CloudResult<String>;

    /// Add `target` as another name for `source`.
    async fn tag_image(&self, source: &str, target: &str) -> CloudResult<()>;

    /// Push an image reference to its registry.
    async fn push_image(&self, image: &str) -> CloudResult<()>;
}

/// Docker Engine API client.
pub struct DockerClient {
    client: Docker,
    registry_token: Option<String>,
}

impl DockerClient {
    /// Connect to the local daemon and verify it answers.
    pub async fn connect() -> CloudResult<Self> {
        let client = Docker::connect_with_local_defaults()?;
        client.ping().await?;
        Ok(Self {
            client,
            registry_token: None,
        })
    }

    /// Authenticate pushes with an OAuth access token.
    pub fn with_registry_token(mut self, token: impl Into<String>) -> Self {
        self.registry_token = Some(token.into());
        self
    }

    fn credentials(&self, image: &str) -> Option<DockerCredentials> {
        self.registry_token.as_ref().map(|token| DockerCredentials {
            username: Some(OAUTH_REGISTRY_USER.to_string()),
            password: Some(token.clone()),
            serveraddress: image.split('/').next().map(str::to_string),
            ..Default::default()
        })
    }
}

/// Split `registry/repo:tag` into repository and tag (default `latest`).
pub fn split_reference(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

#[async_trait]
impl ImageClient for DockerClient {
    async fn build_image(&self, context: BuildArtifact, tag: &str) -> CloudResult<String> {
        info!("Building image {} ({} bytes of context)", tag, context.len());

        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(context.into_bytes().into()));

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(line) = info.stream {
                debug!("Build: {}", line.trim());
            }
            if let Some(error) = info.error {
                return Err(CloudError::Docker(format!("build of {} failed: {}", tag, error)));
            }
        }

        Ok(tag.to_string())
    }

    async fn tag_image(&self, source: &str, target: &str) -> CloudResult<()> {
        let (repo, tag) = split_reference(target);
        self.client
            .tag_image(source, Some(TagImageOptions { repo, tag }))
            .await?;
        debug!("Tagged {} as {}", source, target);
        Ok(())
    }

    async fn push_image(&self, image: &str) -> CloudResult<()> {
        info!("Pushing image {}", image);
        let (repo, tag) = split_reference(image);

        let mut stream = self.client.push_image(
            repo,
            Some(PushImageOptions { tag }),
            self.credentials(image),
        );

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                debug!("Push: {}", status);
            }
            if let Some(error) = info.error {
                return Err(CloudError::Docker(format!("push of {} failed: {}", image, error)));
            }
        }

        Ok(())
    }
}
