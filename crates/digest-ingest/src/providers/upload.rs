//! Upload stage trait

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RemoteId, SourceFile};

/// Transmits raw file bytes to the backend
///
/// Implementations:
/// - `BackendClient`: multipart POST to the backend's upload endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Upload a file and return the backend's identifier for it
    ///
    /// Any failure is reported as `Error::Upload`.
    async fn upload(&self, file: &SourceFile) -> Result<RemoteId>;
}
