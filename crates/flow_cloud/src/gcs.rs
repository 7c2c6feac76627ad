//! Google Cloud Storage JSON API client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::CloudResult;
use crate::gcp::{api_error, GcpCredentials};
use crate::storage::{BlobStorage, BucketState, DEFAULT_LOCATION, DEFAULT_STORAGE_CLASS};

/// Public Cloud Storage endpoint.
pub const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

const SERVICE: &str = "Cloud Storage";

/// Cloud Storage client scoped to one project.
pub struct GcsStorage {
    client: reqwest::Client,
    credentials: GcpCredentials,
    endpoint: String,
}

impl GcsStorage {
    pub fn new(credentials: GcpCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            endpoint: STORAGE_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BucketRequest<'a> {
    name: &'a str,
    storage_class: &'a str,
    location: &'a str,
}

#[async_trait]
impl BlobStorage for GcsStorage {
    async fn ensure_bucket(&self, bucket: &str) -> CloudResult<BucketState> {
        let request = BucketRequest {
            name: bucket,
            storage_class: DEFAULT_STORAGE_CLASS,
            location: DEFAULT_LOCATION,
        };

        let response = self
            .client
            .post(format!("{}/storage/v1/b", self.endpoint))
            .query(&[("project", self.credentials.project_id())])
            .bearer_auth(self.credentials.access_token())
            .json(&request)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!("Created bucket {}", bucket);
                Ok(BucketState::Created)
            }
            StatusCode::CONFLICT => {
                debug!("Bucket {} already exists, reusing it", bucket);
                Ok(BucketState::Reused)
            }
            _ => Err(api_error(SERVICE, response).await),
        }
    }

    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CloudResult<()> {
        let size = bytes.len();
        let response = self
            .client
            .post(format!("{}/upload/storage/v1/b/{}/o", self.endpoint, bucket))
            .query(&[("uploadType", "media"), ("name", object)])
            .bearer_auth(self.credentials.access_token())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(SERVICE, response).await);
        }

        info!("Uploaded gs://{}/{} ({} bytes)", bucket, object, size);
        Ok(())
    }
}
