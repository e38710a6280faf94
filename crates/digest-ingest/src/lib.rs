//! # Digest Ingest
//!
//! Batch ingestion queue for the news digest backend.
//!
//! Scanned newspaper pages are queued as jobs and driven, one at a time, through
//! two remote stages: an upload that returns a backend document id, and a
//! layout/NLP pipeline run that returns the extracted articles. A failed job
//! never stops the batch; it is retried on the next run.
//!
//! ```no_run
//! use std::sync::Arc;
//! use digest_ingest::{BackendClient, IngestConfig, Orchestrator, SourceFile, TracingSink};
//!
//! # async fn run() -> digest_ingest::Result<()> {
//! let config = IngestConfig::load(None)?;
//! let client = Arc::new(BackendClient::new(config.backend.clone(), config.credential_provider())?);
//! let orchestrator = Orchestrator::new(client.clone(), client, Arc::new(TracingSink))
//!     .with_processing_config(&config.processing);
//!
//! orchestrator.enqueue([SourceFile::from_path("page-01.pdf").await?])?;
//! if let Some(summary) = orchestrator.run_batch().await {
//!     println!("{} complete, {} failed", summary.completed, summary.failed);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod processing;
pub mod providers;
pub mod types;

pub use config::{AuthConfig, BackendConfig, IngestConfig, ProcessingConfig};
pub use error::{Error, Result};
pub use processing::{
    BatchProgress, BatchSummary, ChannelSink, IngestEvent, JobQueue, NotificationSink,
    Orchestrator, QueueStats, SinkMessage, TracingSink,
};
pub use providers::{
    BackendClient, CredentialProvider, EnvToken, PipelineClient, SessionFileToken, StaticToken,
    UploadClient,
};
pub use types::{ArticleResult, ExtractionResult, JobId, JobRecord, JobStatus, RemoteId, SourceFile};
