//! Processing stage trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExtractionResult, RemoteId};

/// Runs remote article extraction on an uploaded file
///
/// Implementations:
/// - `BackendClient`: POST to the backend's per-file pipeline endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipelineClient: Send + Sync {
    /// Extract articles from a previously uploaded file
    ///
    /// Any failure is reported as `Error::Process`.
    async fn process(&self, remote_id: &RemoteId) -> Result<ExtractionResult>;
}
