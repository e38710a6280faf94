//! Job record types tracking one file's journey through upload and processing

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use super::ExtractionResult;
use crate::error::Result;

/// Local job identifier, assigned at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier handed out by the backend once an upload succeeds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RemoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Enqueued, never attempted
    Pending,
    /// File bytes are being sent to the backend
    Uploading,
    /// Backend is extracting articles
    Processing,
    /// Extraction succeeded
    Complete,
    /// Upload or extraction failed; retried on the next run
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Uploading => "uploading",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    /// A remote call is outstanding for this job
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Uploading | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether a run should start a new attempt for a job in this state
    pub fn is_eligible(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file waiting to be uploaded
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    /// Original filename
    pub filename: String,
    /// MIME type sent with the multipart upload
    pub content_type: String,
    /// Raw file bytes
    #[serde(skip_serializing)]
    pub data: Bytes,
}

impl SourceFile {
    /// Create a source file, guessing the content type from the extension
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/pdf".to_string());

        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        Ok(Self::new(filename, data))
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One file's ingestion state
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Set once the upload succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub source: SourceFile,
    pub status: JobStatus,
    /// Failure reason, only while `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extraction output, only while `Complete`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionResult>,
    /// Number of upload attempts started
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(source: SourceFile) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            remote_id: None,
            source,
            status: JobStatus::Pending,
            error: None,
            result: None,
            attempts: 0,
            enqueued_at: now,
            updated_at: now,
        }
    }

    pub fn filename(&self) -> &str {
        &self.source.filename
    }

    /// Number of extracted articles, zero unless complete
    pub fn article_count(&self) -> usize {
        self.result.as_ref().map(|r| r.articles.len()).unwrap_or(0)
    }

    /// Begin a new attempt: clears the previous outcome
    pub(crate) fn start_upload(&mut self) {
        self.status = JobStatus::Uploading;
        self.error = None;
        self.result = None;
        self.attempts += 1;
        self.touch();
    }

    /// Store the backend id; a re-upload replaces the previous one
    pub(crate) fn record_upload(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
        self.touch();
    }

    pub(crate) fn start_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.touch();
    }

    pub(crate) fn mark_complete(&mut self, result: ExtractionResult) {
        self.status = JobStatus::Complete;
        self.result = Some(result);
        self.error = None;
        self.touch();
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.result = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
