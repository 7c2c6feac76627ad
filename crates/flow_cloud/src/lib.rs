//! # flow_cloud
//!
//! Adapters the dbt-flow activities are built from.
//!
//! # Features
//!
//! - **Archive**: Package a source tree into a gzip-compressed tar build context
//! - **Build service**: Submit build jobs and wait for them (Google Cloud Build)
//! - **Blob storage**: Create-or-reuse buckets and upload objects (Google Cloud Storage)
//! - **Local client**: Build and push with a Docker daemon, manage instances with `gcloud`
//! - **Mocks**: Capturing build service and storage for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use flow_cloud::{package_directory, BuildService, BuildSpec, BuildStep, CloudBuildClient, GcpCredentials};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = GcpCredentials::new("my-project", "ya29.token")?;
//!     let builds = CloudBuildClient::new(credentials);
//!
//!     let artifact = package_directory(Path::new("./dbt_project")).await?;
//!     println!("Packaged {} files", artifact.file_count());
//!
//!     let spec = BuildSpec::new().step(BuildStep::docker(["push", "gcr.io/my-project/image"]));
//!     let outcome = builds.submit_and_wait(&spec).await?;
//!     println!("Build {} finished: {}", outcome.build_id, outcome.status);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod build;
pub mod cloud_build;
pub mod compute;
pub mod docker;
pub mod error;
pub mod gcloud;
pub mod gcp;
pub mod gcs;
pub mod mock;
pub mod storage;

pub use archive::{package_directory, unpack_archive, BuildArtifact, ARCHIVE_CONTENT_TYPE};
pub use build::{
    BuildOutcome, BuildService, BuildSpec, BuildStatus, BuildStep, StorageSource, DOCKER_BUILDER,
    GCLOUD_BUILDER,
};
pub use cloud_build::CloudBuildClient;
pub use compute::{create_with_container_args, stop_instance_args};
pub use docker::{DockerClient, ImageClient};
pub use error::{CloudError, CloudResult};
pub use gcloud::{ComputeClient, GcloudCli};
pub use gcp::GcpCredentials;
pub use gcs::GcsStorage;
pub use mock::{MockBuild, MockBuildService, MockStorage, UploadedObject};
pub use storage::{BlobStorage, BucketState};
