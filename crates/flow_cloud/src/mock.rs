//! Mock build and storage services for testing.
//!
//! Both mocks capture every call and answer from a script of responses, so
//! activity code can be exercised without cloud credentials.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::build::{BuildOutcome, BuildService, BuildSpec, BuildStatus};
use crate::error::{CloudError, CloudResult};
use crate::storage::{BlobStorage, BucketState};

/// Scripted behavior for one `submit_and_wait` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBuild {
    /// Finish with `SUCCESS`.
    Succeed,
    /// Finish with the given terminal status.
    Finish(BuildStatus),
    /// Fail to reach the service.
    Unavailable(String),
    /// Never finish.
    Hang,
}

/// Mock build service.
#[derive(Clone, Default)]
pub struct MockBuildService {
    script: Arc<RwLock<VecDeque<MockBuild>>>,
    submitted: Arc<RwLock<Vec<BuildSpec>>>,
    counter: Arc<AtomicUsize>,
}

impl MockBuildService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior of the next call. Unscripted calls succeed.
    pub fn then(self, build: MockBuild) -> Self {
        self.script.write().push_back(build);
        self
    }

    /// Queue `count` identical behaviors.
    pub fn then_times(self, count: usize, build: MockBuild) -> Self {
        {
            let mut script = self.script.write();
            for _ in 0..count {
                script.push_back(build.clone());
            }
        }
        self
    }

    /// All specs submitted so far.
    pub fn submitted(&self) -> Vec<BuildSpec> {
        self.submitted.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.submitted.read().len()
    }

    /// Specs whose first step runs the given builder with the given first argument.
    pub fn submitted_with(&self, builder: &str, first_arg: &str) -> Vec<BuildSpec> {
        self.submitted
            .read()
            .iter()
            .filter(|spec| {
                spec.steps.first().map_or(false, |step| {
                    step.name == builder && step.args.first().map(String::as_str) == Some(first_arg)
                })
            })
            .cloned()
            .collect()
    }

    fn next(&self) -> MockBuild {
        self.script.write().pop_front().unwrap_or(MockBuild::Succeed)
    }
}

#[async_trait]
impl BuildService for MockBuildService {
    async fn submit_and_wait(&self, spec: &BuildSpec) -> CloudResult<BuildOutcome> {
        self.submitted.write().push(spec.clone());
        let build_id = format!("mock-build-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);

        match self.next() {
            MockBuild::Succeed => Ok(BuildOutcome {
                build_id,
                status: BuildStatus::Success,
                log_url: None,
            }),
            MockBuild::Finish(status) if status.is_success() => Ok(BuildOutcome {
                build_id,
                status,
                log_url: None,
            }),
            MockBuild::Finish(status) => Err(CloudError::BuildFailed { build_id, status }),
            MockBuild::Unavailable(message) => Err(CloudError::Transport(message)),
            MockBuild::Hang => std::future::pending().await,
        }
    }
}

/// Captured object upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub bucket: String,
    pub object: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Mock blob storage.
#[derive(Clone, Default)]
pub struct MockStorage {
    buckets: Arc<RwLock<HashSet<String>>>,
    ensured: Arc<RwLock<Vec<String>>>,
    uploads: Arc<RwLock<Vec<UploadedObject>>>,
    simulate_failure: Arc<RwLock<Option<u16>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bucket that already exists.
    pub fn add_existing_bucket(self, bucket: impl Into<String>) -> Self {
        self.buckets.write().insert(bucket.into());
        self
    }

    /// Make every call fail with the given HTTP status.
    pub fn simulate_failure(self, status: u16) -> Self {
        *self.simulate_failure.write() = Some(status);
        self
    }

    /// Bucket names passed to `ensure_bucket`, in call order.
    pub fn ensured_buckets(&self) -> Vec<String> {
        self.ensured.read().clone()
    }

    pub fn uploads(&self) -> Vec<UploadedObject> {
        self.uploads.read().clone()
    }

    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.read().contains(bucket)
    }

    fn check_failure(&self) -> CloudResult<()> {
        match *self.simulate_failure.read() {
            Some(status) => Err(CloudError::Api {
                service: "mock storage",
                status,
                message: "simulated failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BlobStorage for MockStorage {
    async fn ensure_bucket(&self, bucket: &str) -> CloudResult<BucketState> {
        self.ensured.write().push(bucket.to_string());
        self.check_failure()?;
        if self.buckets.write().insert(bucket.to_string()) {
            Ok(BucketState::Created)
        } else {
            Ok(BucketState::Reused)
        }
    }

    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CloudResult<()> {
        self.check_failure()?;
        if !self.bucket_exists(bucket) {
            return Err(CloudError::Api {
                service: "mock storage",
                status: 404,
                message: format!("bucket {} does not exist", bucket),
            });
        }
        self.uploads.write().push(UploadedObject {
            bucket: bucket.to_string(),
            object: object.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(())
    }
}
