//! Integration tests for the packaging and staging path.
//!
//! These use the mock build service and storage so no cloud account is needed.

use flow_cloud::{
    package_directory, unpack_archive, BlobStorage, BucketState, BuildService, BuildSpec,
    BuildStatus, BuildStep, CloudError, MockBuild, MockBuildService, MockStorage, StorageSource,
    ARCHIVE_CONTENT_TYPE, DOCKER_BUILDER,
};
use tempfile::TempDir;

fn dbt_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM python:3.11-slim\nCOPY . /app\n").unwrap();
    std::fs::write(dir.path().join("dbt_project.yml"), "name: jaffle_shop\n").unwrap();
    std::fs::create_dir(dir.path().join("models")).unwrap();
    std::fs::write(dir.path().join("models/customers.sql"), "select * from raw_customers").unwrap();
    dir
}

/// Stage a packaged project and build it from the uploaded object.
#[tokio::test]
async fn test_stage_and_build_from_storage() {
    let project = dbt_project();
    let storage = MockStorage::new();
    let builds = MockBuildService::new();

    let artifact = package_directory(project.path()).await.unwrap();
    assert_eq!(artifact.file_count(), 3);

    assert_eq!(storage.ensure_bucket("p1_img_bucket").await.unwrap(), BucketState::Created);
    storage
        .upload_object("p1_img_bucket", "zipfile_img.tar.gz", ARCHIVE_CONTENT_TYPE, artifact.into_bytes())
        .await
        .unwrap();

    let spec = BuildSpec::new()
        .source(StorageSource::new("p1_img_bucket", "zipfile_img.tar.gz"))
        .step(BuildStep::docker(["build", "-t", "gcr.io/p1/img", "."]));
    let outcome = builds.submit_and_wait(&spec).await.unwrap();
    assert_eq!(outcome.status, BuildStatus::Success);

    // The uploaded object is the project, byte for byte.
    let restored = TempDir::new().unwrap();
    let upload = &storage.uploads()[0];
    assert_eq!(upload.content_type, "application/gzip");
    unpack_archive(&upload.bytes, restored.path()).await.unwrap();
    assert_eq!(
        std::fs::read(restored.path().join("models/customers.sql")).unwrap(),
        std::fs::read(project.path().join("models/customers.sql")).unwrap()
    );

    let submitted = builds.submitted_with(DOCKER_BUILDER, "build");
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].source.as_ref().unwrap().object, "zipfile_img.tar.gz");
}

/// A second staging of the same image reuses the bucket.
#[tokio::test]
async fn test_restaging_reuses_bucket() {
    let storage = MockStorage::new().add_existing_bucket("p1_img_bucket");
    assert_eq!(storage.ensure_bucket("p1_img_bucket").await.unwrap(), BucketState::Reused);
}

/// Terminal build failures are not worth retrying; outages are.
#[tokio::test]
async fn test_build_failure_classification() {
    let builds = MockBuildService::new()
        .then(MockBuild::Finish(BuildStatus::Timeout))
        .then(MockBuild::Unavailable("connection refused".to_string()));
    let spec = BuildSpec::new().step(BuildStep::docker(["push", "gcr.io/p1/img"]));

    let terminal = builds.submit_and_wait(&spec).await.unwrap_err();
    assert!(matches!(terminal, CloudError::BuildFailed { .. }));
    assert!(!terminal.is_retryable());

    let outage = builds.submit_and_wait(&spec).await.unwrap_err();
    assert!(outage.is_retryable());
}
