//! Blob storage contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CloudResult;

/// Storage class requested for new buckets.
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Location requested for new buckets.
pub const DEFAULT_LOCATION: &str = "US";

/// What `ensure_bucket` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketState {
    Created,
    Reused,
}

/// Object storage used to stage build sources.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Create the bucket, or reuse it if it already exists.
    async fn ensure_bucket(&self, bucket: &str) -> CloudResult<BucketState>;

    /// Upload an object, replacing any existing object of the same name.
    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CloudResult<()>;
}
