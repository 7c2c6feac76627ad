//! Shared plumbing for Google Cloud REST APIs.

use serde::Deserialize;

use crate::error::{CloudError, CloudResult};

/// Project and bearer token used for every request.
#[derive(Clone)]
pub struct GcpCredentials {
    project_id: String,
    access_token: String,
}

impl GcpCredentials {
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> CloudResult<Self> {
        let project_id = project_id.into();
        if project_id.trim().is_empty() {
            return Err(CloudError::InvalidConfig("project id is empty".to_string()));
        }
        Ok(Self {
            project_id,
            access_token: access_token.into(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for GcpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpCredentials")
            .field("project_id", &self.project_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Turn a non-success response into a `CloudError::Api`.
pub(crate) async fn api_error(service: &'static str, response: reqwest::Response) -> CloudError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    CloudError::Api {
        service,
        status,
        message: error_message(&body),
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => match parsed.error.status {
            Some(status) => format!("{} ({})", parsed.error.message, status),
            None => parsed.error.message,
        },
        Err(_) => body.to_string(),
    }
}
