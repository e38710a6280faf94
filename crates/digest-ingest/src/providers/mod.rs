//! Remote collaborators the orchestrator drives
//!
//! The upload and pipeline stages are trait seams so the orchestrator can be
//! exercised without a backend. `BackendClient` implements both over HTTP.

pub mod backend;
pub mod credentials;
pub mod pipeline;
pub mod upload;

pub use backend::BackendClient;
pub use credentials::{CredentialProvider, EnvToken, SessionFileToken, StaticToken};
pub use pipeline::PipelineClient;
pub use upload::UploadClient;
