//! Core types for the ingestion queue

pub mod extraction;
pub mod job;

pub use extraction::{ArticleResult, BoundingBox, ExtractionResult, SegmentKind, TextSegment};
pub use job::{JobId, JobRecord, JobStatus, RemoteId, SourceFile};
