//! Lifecycle events and the sinks that consume them

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::types::{JobId, RemoteId};

/// One job status transition, in the order it happened
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    UploadStarted {
        job_id: JobId,
        filename: String,
        attempt: u32,
    },
    Uploaded {
        job_id: JobId,
        filename: String,
        remote_id: RemoteId,
    },
    UploadFailed {
        job_id: JobId,
        filename: String,
        reason: String,
    },
    ProcessingStarted {
        job_id: JobId,
        filename: String,
    },
    Processed {
        job_id: JobId,
        filename: String,
        articles: usize,
    },
    ProcessFailed {
        job_id: JobId,
        filename: String,
        reason: String,
    },
    /// The run was cancelled while this job was in flight
    Cancelled {
        job_id: JobId,
        filename: String,
    },
}

impl IngestEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            IngestEvent::UploadStarted { job_id, .. }
            | IngestEvent::Uploaded { job_id, .. }
            | IngestEvent::UploadFailed { job_id, .. }
            | IngestEvent::ProcessingStarted { job_id, .. }
            | IngestEvent::Processed { job_id, .. }
            | IngestEvent::ProcessFailed { job_id, .. }
            | IngestEvent::Cancelled { job_id, .. } => *job_id,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            IngestEvent::UploadStarted { filename, .. }
            | IngestEvent::Uploaded { filename, .. }
            | IngestEvent::UploadFailed { filename, .. }
            | IngestEvent::ProcessingStarted { filename, .. }
            | IngestEvent::Processed { filename, .. }
            | IngestEvent::ProcessFailed { filename, .. }
            | IngestEvent::Cancelled { filename, .. } => filename,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            IngestEvent::UploadFailed { .. }
                | IngestEvent::ProcessFailed { .. }
                | IngestEvent::Cancelled { .. }
        )
    }
}

impl fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestEvent::UploadStarted { filename, attempt, .. } if *attempt > 1 => {
                write!(f, "BATCH: Retrying upload for {} (attempt {})", filename, attempt)
            }
            IngestEvent::UploadStarted { filename, .. } => {
                write!(f, "BATCH: Starting upload for {}", filename)
            }
            IngestEvent::Uploaded { filename, remote_id, .. } => {
                write!(f, "BATCH: Uploaded {} as {}", filename, remote_id)
            }
            IngestEvent::UploadFailed { filename, reason, .. } => {
                write!(f, "BATCH ERROR: {} upload - {}", filename, reason)
            }
            IngestEvent::ProcessingStarted { filename, .. } => {
                write!(f, "BATCH: Analyzing {}...", filename)
            }
            IngestEvent::Processed { filename, articles, .. } => write!(
                f,
                "BATCH SUCCESS: {} successfully indexed ({} articles).",
                filename, articles
            ),
            IngestEvent::ProcessFailed { filename, reason, .. } => {
                write!(f, "BATCH ERROR: {} - {}", filename, reason)
            }
            IngestEvent::Cancelled { filename, .. } => {
                write!(f, "BATCH CANCELLED: {}", filename)
            }
        }
    }
}

/// Outcome of one non-no-op run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchSummary {
    /// Jobs for which an upload was started
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Jobs already complete before the run
    pub skipped: usize,
    /// Run stopped early on cancellation
    pub cancelled: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Receiver of orchestrator progress
///
/// Calls are synchronous and happen on the task running the batch, in the
/// exact order of the transitions they report.
pub trait NotificationSink: Send + Sync {
    fn on_log(&self, event: &IngestEvent);

    /// Called once per run, after every attempted job is terminal
    fn on_batch_complete(&self, summary: &BatchSummary);
}

/// Writes every event as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn on_log(&self, event: &IngestEvent) {
        if event.is_failure() {
            tracing::warn!(job_id = %event.job_id(), "{}", event);
        } else {
            tracing::info!(job_id = %event.job_id(), "{}", event);
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        tracing::info!(
            "Batch finished: {} attempted, {} complete, {} failed, {} skipped{} in {:.1}s",
            summary.attempted,
            summary.completed,
            summary.failed,
            summary.skipped,
            if summary.cancelled { " (cancelled)" } else { "" },
            summary.elapsed.as_secs_f64()
        );
    }
}

/// Message forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    Log(IngestEvent),
    BatchComplete(BatchSummary),
}

/// Forwards notifications to a presentation layer over a channel
///
/// A closed receiver is not an error for the batch; messages are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SinkMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn on_log(&self, event: &IngestEvent) {
        if self.sender.send(SinkMessage::Log(event.clone())).is_err() {
            tracing::debug!("Notification receiver dropped, discarding event");
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        if self
            .sender
            .send(SinkMessage::BatchComplete(summary.clone()))
            .is_err()
        {
            tracing::debug!("Notification receiver dropped, discarding batch summary");
        }
    }
}
