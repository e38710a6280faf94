//! HTTP client for the document-intelligence backend
//!
//! Upload: `POST {base}/pdfs/upload/` (multipart `file`), returns `{"id": ...}`.
//! Process: `POST {base}/pipeline/{id}/pipeline`, returns the extraction result.
//! Both calls carry `Authorization: Bearer <token>`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{ExtractionResult, RemoteId, SourceFile};

use super::credentials::CredentialProvider;
use super::pipeline::PipelineClient;
use super::upload::UploadClient;

/// Longest backend error body echoed into a job's error
const MAX_ERROR_BODY: usize = 200;

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
    #[serde(default)]
    filename: Option<String>,
}

/// Backend API client implementing both pipeline stages
pub struct BackendClient {
    client: Client,
    config: BackendConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl BackendClient {
    pub fn new(config: BackendConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Token or an `authorization failed` reason
    async fn token(&self) -> std::result::Result<String, String> {
        self.credentials
            .bearer_token()
            .await
            .map_err(|e| format!("authorization failed: {}", e.reason()))
    }
}

/// Turn a non-success response into a failure reason
async fn check_status(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    let prefix = if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        "authorization failed: "
    } else {
        ""
    };

    Err(match detail {
        Some(detail) => format!("{}HTTP {}: {}", prefix, status, detail),
        None => format!("{}HTTP {}", prefix, status),
    })
}

/// Extract `detail` from a FastAPI error body, falling back to the raw text
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let detail = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    };

    Some(detail.chars().take(MAX_ERROR_BODY).collect())
}

#[async_trait]
impl UploadClient for BackendClient {
    async fn upload(&self, file: &SourceFile) -> Result<RemoteId> {
        if file.data.len() > self.config.max_upload_size {
            return Err(Error::upload(format!(
                "{} is {} bytes, above the {} byte upload limit",
                file.filename,
                file.data.len(),
                self.config.max_upload_size
            )));
        }

        let token = self.token().await.map_err(Error::upload)?;

        let part = Part::bytes(file.data.to_vec())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(|e| {
                Error::upload(format!("invalid content type '{}': {}", file.content_type, e))
            })?;
        let form = Form::new().part("file", part);

        let url = self.config.upload_url();
        tracing::debug!("Uploading {} ({} bytes) to {}", file.filename, file.data.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::upload(format!("request to {} failed: {}", url, e)))?;
        let response = check_status(response).await.map_err(Error::upload)?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::upload(format!("invalid upload response: {}", e)))?;

        if body.id.trim().is_empty() {
            return Err(Error::upload("upload response carried an empty id"));
        }
        if let Some(stored) = body.filename.as_deref() {
            tracing::debug!("Backend stored {} as {} ({})", file.filename, stored, body.id);
        }

        Ok(RemoteId::new(body.id))
    }
}

#[async_trait]
impl PipelineClient for BackendClient {
    async fn process(&self, remote_id: &RemoteId) -> Result<ExtractionResult> {
        let token = self.token().await.map_err(Error::process)?;

        let url = self.config.pipeline_url(remote_id.as_str());
        tracing::debug!("Running pipeline for {} at {}", remote_id, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::process(format!("request to {} failed: {}", url, e)))?;
        let response = check_status(response).await.map_err(Error::process)?;

        response
            .json::<ExtractionResult>()
            .await
            .map_err(|e| Error::process(format!("invalid pipeline response: {}", e)))
    }
}
