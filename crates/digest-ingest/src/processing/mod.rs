//! Queue, orchestration, and progress notification

pub mod events;
pub mod job_queue;
pub mod orchestrator;

pub use events::{BatchSummary, ChannelSink, IngestEvent, NotificationSink, SinkMessage, TracingSink};
pub use job_queue::{BatchProgress, JobQueue, QueueStats};
pub use orchestrator::Orchestrator;
