//! Sequential batch orchestrator
//!
//! Drives every eligible job through upload then processing, one job at a
//! time and in queue order. Remote failures are recorded on the job and never
//! abort the batch.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ProcessingConfig;
use crate::error::Result;
use crate::providers::{PipelineClient, UploadClient};
use crate::types::{JobId, JobRecord, JobStatus, SourceFile};

use super::events::{BatchSummary, IngestEvent, NotificationSink};
use super::job_queue::{BatchProgress, JobQueue, QueueStats};

/// How a single job attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Complete,
    Failed,
    Cancelled,
}

/// Why a remote call did not produce a value
#[derive(Debug)]
enum StageFailure {
    Remote(String),
    TimedOut(Duration),
    Cancelled,
}

impl StageFailure {
    fn reason(&self, stage: &str) -> String {
        match self {
            StageFailure::Remote(reason) => reason.clone(),
            StageFailure::TimedOut(limit) => {
                format!("{} timed out after {}s", stage, limit.as_secs_f64())
            }
            StageFailure::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Clears the run flag when the run ends, including on panic or drop
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the queue and the run-state guard
///
/// Share it as `Arc<Orchestrator>`; every method takes `&self`.
pub struct Orchestrator {
    queue: JobQueue,
    uploader: Arc<dyn UploadClient>,
    pipeline: Arc<dyn PipelineClient>,
    sink: Arc<dyn NotificationSink>,
    upload_timeout: Duration,
    process_timeout: Duration,
    running: AtomicBool,
    progress: RwLock<BatchProgress>,
}

impl Orchestrator {
    /// Create an orchestrator with the default stage timeouts
    pub fn new(
        uploader: Arc<dyn UploadClient>,
        pipeline: Arc<dyn PipelineClient>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let defaults = ProcessingConfig::default();
        Self {
            queue: JobQueue::new(),
            uploader,
            pipeline,
            sink,
            upload_timeout: defaults.upload_timeout(),
            process_timeout: defaults.process_timeout(),
            running: AtomicBool::new(false),
            progress: RwLock::new(BatchProgress::default()),
        }
    }

    /// Apply stage timeouts from configuration
    pub fn with_processing_config(self, config: &ProcessingConfig) -> Self {
        self.with_timeouts(config.upload_timeout(), config.process_timeout())
    }

    pub fn with_timeouts(mut self, upload: Duration, process: Duration) -> Self {
        self.upload_timeout = upload;
        self.process_timeout = process;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Append files as pending jobs; rejected while a run is active
    pub fn enqueue(&self, files: impl IntoIterator<Item = SourceFile>) -> Result<Vec<JobId>> {
        self.queue.enqueue_idle(&self.running, files)
    }

    /// Remove a job; rejected while a run is active or the job is in flight
    pub fn remove(&self, job_id: JobId) -> Result<JobRecord> {
        self.queue.remove_idle(&self.running, job_id)
    }

    /// Drop completed jobs; rejected while a run is active
    pub fn clear_finished(&self) -> Result<usize> {
        self.queue.clear_finished_idle(&self.running)
    }

    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.queue.snapshot()
    }

    pub fn get(&self, job_id: JobId) -> Option<JobRecord> {
        self.queue.get(job_id)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Progress of the current run, or of the last one when idle
    pub fn progress(&self) -> BatchProgress {
        *self.progress.read()
    }

    /// Claim the run flag and capture the jobs this run will visit
    fn try_begin_run(&self) -> Option<(RunGuard<'_>, Vec<(JobId, JobStatus)>)> {
        let plan = self.queue.begin_run(&self.running)?;
        Some((RunGuard(&self.running), plan))
    }

    /// Run every pending or failed job once
    ///
    /// Returns `None` without side effects if a run is already active.
    pub async fn run_batch(&self) -> Option<BatchSummary> {
        self.run_batch_with_cancel(CancellationToken::new()).await
    }

    /// Like [`run_batch`](Self::run_batch), stopping early when `cancel` fires
    ///
    /// The job in flight at cancellation ends `Failed` with error `cancelled`;
    /// jobs not yet started keep their status.
    pub async fn run_batch_with_cancel(&self, cancel: CancellationToken) -> Option<BatchSummary> {
        let Some((guard, plan)) = self.try_begin_run() else {
            tracing::debug!("Batch already running, ignoring run request");
            return None;
        };

        let started = Instant::now();
        let eligible = plan.iter().filter(|(_, s)| s.is_eligible()).count();
        let mut summary = BatchSummary::default();

        *self.progress.write() = BatchProgress {
            total: eligible,
            finished: 0,
        };
        tracing::info!(
            "Starting batch: {} of {} queued jobs eligible",
            eligible,
            plan.len()
        );

        for (job_id, status) in plan {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            if !status.is_eligible() {
                tracing::debug!(job_id = %job_id, "Skipping {} job", status);
                summary.skipped += 1;
                continue;
            }

            summary.attempted += 1;
            let span = tracing::info_span!(
                "ingest_job",
                job_id = %job_id,
                filename = tracing::field::Empty
            );
            let outcome = self.run_job(job_id, &cancel).instrument(span).await;
            self.progress.write().finished += 1;

            match outcome {
                JobOutcome::Complete => summary.completed += 1,
                JobOutcome::Failed => summary.failed += 1,
                JobOutcome::Cancelled => {
                    summary.failed += 1;
                    summary.cancelled = true;
                    break;
                }
            }
        }

        summary.elapsed = started.elapsed();
        drop(guard);
        self.sink.on_batch_complete(&summary);

        Some(summary)
    }

    /// Upload then process one job, recording the outcome on its record
    async fn run_job(&self, job_id: JobId, cancel: &CancellationToken) -> JobOutcome {
        let Some(record) = self.transition(job_id, JobRecord::start_upload) else {
            return JobOutcome::Failed;
        };
        let filename = record.filename().to_string();
        tracing::Span::current().record("filename", filename.as_str());

        self.emit(IngestEvent::UploadStarted {
            job_id,
            filename: filename.clone(),
            attempt: record.attempts,
        });

        let upload = self.uploader.upload(&record.source);
        let remote_id = match self.call_stage(self.upload_timeout, cancel, upload).await {
            Ok(remote_id) => remote_id,
            Err(failure) => {
                let reason = failure.reason("upload");
                self.transition(job_id, |j| j.mark_failed(reason.clone()));
                return match failure {
                    StageFailure::Cancelled => {
                        self.emit(IngestEvent::Cancelled { job_id, filename });
                        JobOutcome::Cancelled
                    }
                    _ => {
                        self.emit(IngestEvent::UploadFailed {
                            job_id,
                            filename,
                            reason,
                        });
                        JobOutcome::Failed
                    }
                };
            }
        };

        self.transition(job_id, |j| j.record_upload(remote_id.clone()));
        self.emit(IngestEvent::Uploaded {
            job_id,
            filename: filename.clone(),
            remote_id: remote_id.clone(),
        });

        if cancel.is_cancelled() {
            let reason = StageFailure::Cancelled.reason("processing");
            self.transition(job_id, |j| j.mark_failed(reason));
            self.emit(IngestEvent::Cancelled { job_id, filename });
            return JobOutcome::Cancelled;
        }

        self.transition(job_id, JobRecord::start_processing);
        self.emit(IngestEvent::ProcessingStarted {
            job_id,
            filename: filename.clone(),
        });

        let process = self.pipeline.process(&remote_id);
        match self.call_stage(self.process_timeout, cancel, process).await {
            Ok(result) => {
                let articles = result.articles.len();
                self.transition(job_id, |j| j.mark_complete(result));
                self.emit(IngestEvent::Processed {
                    job_id,
                    filename,
                    articles,
                });
                JobOutcome::Complete
            }
            Err(failure) => {
                let reason = failure.reason("processing");
                self.transition(job_id, |j| j.mark_failed(reason.clone()));
                match failure {
                    StageFailure::Cancelled => {
                        self.emit(IngestEvent::Cancelled { job_id, filename });
                        JobOutcome::Cancelled
                    }
                    _ => {
                        self.emit(IngestEvent::ProcessFailed {
                            job_id,
                            filename,
                            reason,
                        });
                        JobOutcome::Failed
                    }
                }
            }
        }
    }

    /// Await a remote call bounded by `limit` and `cancel`
    async fn call_stage<T, F>(
        &self,
        limit: Duration,
        cancel: &CancellationToken,
        call: F,
    ) -> std::result::Result<T, StageFailure>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StageFailure::Cancelled),
            outcome = tokio::time::timeout(limit, call) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(StageFailure::Remote(e.reason())),
                Err(_) => Err(StageFailure::TimedOut(limit)),
            },
        }
    }

    fn transition<F>(&self, job_id: JobId, f: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let record = self.queue.update(job_id, f);
        match &record {
            Some(r) => {
                tracing::debug!(job_id = %job_id, status = %r.status, "Job status transition")
            }
            None => tracing::warn!(job_id = %job_id, "Job disappeared from the queue mid-run"),
        }
        record
    }

    fn emit(&self, event: IngestEvent) {
        self.sink.on_log(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::pipeline::MockPipelineClient;
    use crate::providers::upload::MockUploadClient;
    use crate::error::Error;
    use crate::types::{ArticleResult, ExtractionResult, RemoteId};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Records upload order; fails for the listed filenames
    #[derive(Default)]
    struct FakeUploader {
        calls: Mutex<Vec<String>>,
        fail: HashSet<String>,
    }

    impl FakeUploader {
        fn failing(names: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: names.iter().map(|n| n.to_string()).collect(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl UploadClient for FakeUploader {
        async fn upload(&self, file: &SourceFile) -> Result<RemoteId> {
            self.calls.lock().push(file.filename.clone());
            if self.fail.contains(&file.filename) {
                return Err(Error::upload("HTTP 500 Internal Server Error"));
            }
            Ok(RemoteId::new(format!("remote-{}", file.filename)))
        }
    }

    /// Returns one article per file; fails for the listed remote ids
    #[derive(Default)]
    struct FakePipeline {
        calls: Mutex<Vec<RemoteId>>,
        fail: HashSet<String>,
    }

    impl FakePipeline {
        fn failing(remote_ids: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: remote_ids.iter().map(|n| n.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl PipelineClient for FakePipeline {
        async fn process(&self, remote_id: &RemoteId) -> Result<ExtractionResult> {
            self.calls.lock().push(remote_id.clone());
            if self.fail.contains(remote_id.as_str()) {
                return Err(Error::process("Processing failed."));
            }
            Ok(ExtractionResult {
                articles: vec![ArticleResult {
                    headline: "X".to_string(),
                    ..Default::default()
                }],
                unassigned_segments: Vec::new(),
            })
        }
    }

    /// Blocks every upload until released
    #[derive(Default)]
    struct GatedUploader {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UploadClient for GatedUploader {
        async fn upload(&self, file: &SourceFile) -> Result<RemoteId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(RemoteId::new(file.filename.clone()))
        }
    }

    /// Never finishes
    struct StalledUploader;

    #[async_trait]
    impl UploadClient for StalledUploader {
        async fn upload(&self, _file: &SourceFile) -> Result<RemoteId> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RemoteId::from("late"))
        }
    }

    /// Never finishes
    struct StalledPipeline;

    #[async_trait]
    impl PipelineClient for StalledPipeline {
        async fn process(&self, _remote_id: &RemoteId) -> Result<ExtractionResult> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ExtractionResult::default())
        }
    }

    /// Fires the token from inside a successful upload
    struct CancellingUploader {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl UploadClient for CancellingUploader {
        async fn upload(&self, file: &SourceFile) -> Result<RemoteId> {
            self.cancel.cancel();
            Ok(RemoteId::new(format!("remote-{}", file.filename)))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<IngestEvent>>,
        completions: Mutex<Vec<BatchSummary>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<IngestEvent> {
            self.events.lock().clone()
        }

        fn completions(&self) -> usize {
            self.completions.lock().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn on_log(&self, event: &IngestEvent) {
            self.events.lock().push(event.clone());
        }

        fn on_batch_complete(&self, summary: &BatchSummary) {
            self.completions.lock().push(summary.clone());
        }
    }

    fn pdfs(names: &[&str]) -> Vec<SourceFile> {
        names
            .iter()
            .map(|n| SourceFile::new(*n, b"%PDF-1.4".to_vec()))
            .collect()
    }

    fn orchestrator(
        uploader: Arc<dyn UploadClient>,
        pipeline: Arc<dyn PipelineClient>,
        sink: Arc<RecordingSink>,
    ) -> Orchestrator {
        Orchestrator::new(uploader, pipeline, sink)
    }

    /// (kind, filename) pairs for order assertions
    fn event_trace(events: &[IngestEvent]) -> Vec<(&'static str, String)> {
        events
            .iter()
            .map(|e| {
                let kind = match e {
                    IngestEvent::UploadStarted { .. } => "upload_started",
                    IngestEvent::Uploaded { .. } => "uploaded",
                    IngestEvent::UploadFailed { .. } => "upload_failed",
                    IngestEvent::ProcessingStarted { .. } => "processing_started",
                    IngestEvent::Processed { .. } => "processed",
                    IngestEvent::ProcessFailed { .. } => "process_failed",
                    IngestEvent::Cancelled { .. } => "cancelled",
                };
                (kind, e.filename().to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_two_file_scenario() {
        let uploader = Arc::new(FakeUploader::default());
        let pipeline = Arc::new(FakePipeline::failing(&["remote-B.pdf"]));
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(uploader.clone(), pipeline, sink.clone());

        let ids = orch.enqueue(pdfs(&["A.pdf", "B.pdf"])).unwrap();
        let summary = orch.run_batch().await.unwrap();

        let a = orch.get(ids[0]).unwrap();
        assert_eq!(a.status, JobStatus::Complete);
        assert_eq!(a.article_count(), 1);
        assert_eq!(a.result.as_ref().unwrap().articles[0].headline, "X");
        assert!(a.error.is_none());
        assert_eq!(a.remote_id, Some(RemoteId::from("remote-A.pdf")));

        let b = orch.get(ids[1]).unwrap();
        assert_eq!(b.status, JobStatus::Failed);
        assert!(!b.error.as_deref().unwrap_or_default().is_empty());
        assert!(b.result.is_none());

        assert_eq!(sink.completions(), 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!orch.is_running());

        let a_name = "A.pdf".to_string();
        let b_name = "B.pdf".to_string();
        assert_eq!(
            event_trace(&sink.events()),
            vec![
                ("upload_started", a_name.clone()),
                ("uploaded", a_name.clone()),
                ("processing_started", a_name.clone()),
                ("processed", a_name),
                ("upload_started", b_name.clone()),
                ("uploaded", b_name.clone()),
                ("processing_started", b_name.clone()),
                ("process_failed", b_name),
            ]
        );
    }

    #[tokio::test]
    async fn test_all_jobs_terminal_and_fifo_uploads() {
        let uploader = Arc::new(FakeUploader::failing(&["c.pdf"]));
        let pipeline = Arc::new(FakePipeline::failing(&["remote-e.pdf"]));
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(uploader.clone(), pipeline, sink);

        let names = ["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf"];
        orch.enqueue(pdfs(&names[..2])).unwrap();
        orch.enqueue(pdfs(&names[2..])).unwrap();
        orch.run_batch().await.unwrap();

        assert_eq!(uploader.calls(), names.to_vec());
        assert!(orch.snapshot().iter().all(|j| j.status.is_terminal()));
        let stats = orch.stats();
        assert_eq!(stats.complete, 3);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_upload_failure_does_not_block_later_jobs() {
        let uploader = Arc::new(FakeUploader::failing(&["A.pdf"]));
        let pipeline = Arc::new(FakePipeline::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(uploader, pipeline.clone(), sink.clone());

        let ids = orch.enqueue(pdfs(&["A.pdf", "B.pdf"])).unwrap();
        orch.run_batch().await.unwrap();

        let a = orch.get(ids[0]).unwrap();
        assert_eq!(a.status, JobStatus::Failed);
        assert!(a.remote_id.is_none());
        assert_eq!(a.error.as_deref(), Some("HTTP 500 Internal Server Error"));
        assert_eq!(orch.get(ids[1]).unwrap().status, JobStatus::Complete);

        // processing is never attempted after a failed upload
        assert_eq!(*pipeline.calls.lock(), vec![RemoteId::from("remote-B.pdf")]);
        assert_eq!(
            event_trace(&sink.events())[..2],
            [
                ("upload_started", "A.pdf".to_string()),
                ("upload_failed", "A.pdf".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_run_is_noop() {
        let uploader = Arc::new(GatedUploader::default());
        let pipeline = Arc::new(FakePipeline::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = Arc::new(orchestrator(uploader.clone(), pipeline, sink.clone()));
        let ids = orch.enqueue(pdfs(&["A.pdf"])).unwrap();

        let first = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.run_batch().await }
        });
        uploader.entered.notified().await;

        assert!(orch.is_running());
        assert_eq!(orch.progress(), BatchProgress { total: 1, finished: 0 });
        assert!(orch.run_batch().await.is_none());
        assert!(matches!(orch.remove(ids[0]), Err(Error::InvalidOperation(_))));
        assert!(orch.clear_finished().is_err());
        assert!(matches!(
            orch.enqueue(pdfs(&["B.pdf"])),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(orch.stats().total_jobs, 1);
        assert_eq!(orch.get(ids[0]).unwrap().status, JobStatus::Uploading);

        uploader.release.notify_one();
        let summary = first.await.unwrap().unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(orch.progress().percent_complete(), 100.0);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.completions(), 1);
        assert!(!orch.is_running());
        assert!(orch.snapshot().iter().all(|j| j.status.is_terminal()));
        assert!(orch.enqueue(pdfs(&["B.pdf"])).is_ok());
        assert!(orch.remove(ids[0]).is_ok());
    }

    #[tokio::test]
    async fn test_completed_job_is_never_reuploaded() {
        let mut uploader = MockUploadClient::new();
        uploader
            .expect_upload()
            .times(1)
            .returning(|_| Ok(RemoteId::from("r-1")));
        let mut pipeline = MockPipelineClient::new();
        pipeline
            .expect_process()
            .times(1)
            .returning(|_| Ok(ExtractionResult::default()));
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(Arc::new(uploader), Arc::new(pipeline), sink.clone());

        orch.enqueue(pdfs(&["A.pdf"])).unwrap();
        orch.run_batch().await.unwrap();
        let second = orch.run_batch().await.unwrap();

        assert_eq!(second.skipped, 1);
        assert_eq!(second.attempted, 0);
        assert_eq!(sink.completions(), 2);
        assert_eq!(sink.events().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_job_is_retried_next_run() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut uploader = MockUploadClient::new();
        uploader.expect_upload().times(2).returning({
            let attempts = Arc::clone(&attempts);
            move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::upload("connection reset"))
                } else {
                    Ok(RemoteId::from("r-2"))
                }
            }
        });
        let mut pipeline = MockPipelineClient::new();
        pipeline
            .expect_process()
            .withf(|id| id.as_str() == "r-2")
            .times(1)
            .returning(|_| Ok(ExtractionResult::default()));
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(Arc::new(uploader), Arc::new(pipeline), sink.clone());

        let ids = orch.enqueue(pdfs(&["A.pdf"])).unwrap();
        orch.run_batch().await.unwrap();
        let job = orch.get(ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("connection reset"));

        orch.run_batch().await.unwrap();
        let job = orch.get(ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.error.is_none());
        assert_eq!(job.attempts, 2);
        assert!(matches!(
            sink.events()[2],
            IngestEvent::UploadStarted { attempt: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_process_failure_reuploads_on_retry() {
        let uploader = Arc::new(FakeUploader::default());
        let pipeline = Arc::new(FakePipeline::failing(&["remote-A.pdf"]));
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(uploader.clone(), pipeline, sink);

        let ids = orch.enqueue(pdfs(&["A.pdf"])).unwrap();
        orch.run_batch().await.unwrap();
        orch.run_batch().await.unwrap();

        let job = orch.get(ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.remote_id, Some(RemoteId::from("remote-A.pdf")));
        assert_eq!(uploader.calls(), vec!["A.pdf", "A.pdf"]);
    }

    #[tokio::test]
    async fn test_upload_timeout_marks_job_failed() {
        let pipeline = Arc::new(FakePipeline::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(Arc::new(StalledUploader), pipeline, sink.clone())
            .with_timeouts(Duration::from_millis(50), Duration::from_secs(5));

        let ids = orch.enqueue(pdfs(&["slow.pdf"])).unwrap();
        let summary = orch.run_batch().await.unwrap();

        let job = orch.get(ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("upload timed out"));
        assert_eq!(summary.failed, 1);
        assert_eq!(sink.completions(), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_upload() {
        let uploader = Arc::new(GatedUploader::default());
        let pipeline = Arc::new(FakePipeline::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = Arc::new(orchestrator(uploader.clone(), pipeline, sink.clone()));
        let ids = orch.enqueue(pdfs(&["A.pdf", "B.pdf"])).unwrap();
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let orch = Arc::clone(&orch);
            let cancel = cancel.clone();
            async move { orch.run_batch_with_cancel(cancel).await }
        });
        uploader.entered.notified().await;
        cancel.cancel();
        let summary = run.await.unwrap().unwrap();

        assert!(summary.cancelled);
        let a = orch.get(ids[0]).unwrap();
        assert_eq!(a.status, JobStatus::Failed);
        assert_eq!(a.error.as_deref(), Some("cancelled"));
        assert_eq!(orch.get(ids[1]).unwrap().status, JobStatus::Pending);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.completions(), 1);
        assert!(matches!(
            sink.events().last(),
            Some(IngestEvent::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_run_touches_nothing() {
        let uploader = Arc::new(FakeUploader::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(
            uploader.clone(),
            Arc::new(FakePipeline::default()),
            sink.clone(),
        );
        orch.enqueue(pdfs(&["A.pdf"])).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = orch.run_batch_with_cancel(cancel).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.attempted, 0);
        assert!(uploader.calls().is_empty());
        assert!(sink.events().is_empty());
        assert_eq!(sink.completions(), 1);
        assert_eq!(orch.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_process_timeout_marks_job_failed() {
        let uploader = Arc::new(FakeUploader::default());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(uploader, Arc::new(StalledPipeline), sink.clone())
            .with_timeouts(Duration::from_secs(5), Duration::from_millis(50));

        let ids = orch.enqueue(pdfs(&["slow.pdf"])).unwrap();
        let summary = orch.run_batch().await.unwrap();

        let job = orch.get(ids[0]).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("processing timed out after 0.05s")
        );
        assert_eq!(job.remote_id, Some(RemoteId::from("remote-slow.pdf")));
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            sink.events().last(),
            Some(IngestEvent::ProcessFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_between_upload_and_processing() {
        let cancel = CancellationToken::new();
        let uploader = Arc::new(CancellingUploader {
            cancel: cancel.clone(),
        });
        let mut pipeline = MockPipelineClient::new();
        pipeline.expect_process().times(0);
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(uploader, Arc::new(pipeline), sink.clone());

        let ids = orch.enqueue(pdfs(&["A.pdf", "B.pdf"])).unwrap();
        let summary = orch.run_batch_with_cancel(cancel).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.attempted, 1);
        let a = orch.get(ids[0]).unwrap();
        assert_eq!(a.status, JobStatus::Failed);
        assert_eq!(a.error.as_deref(), Some("cancelled"));
        assert_eq!(a.remote_id, Some(RemoteId::from("remote-A.pdf")));
        assert_eq!(orch.get(ids[1]).unwrap().status, JobStatus::Pending);

        let a_name = "A.pdf".to_string();
        assert_eq!(
            event_trace(&sink.events()),
            vec![
                ("upload_started", a_name.clone()),
                ("uploaded", a_name.clone()),
                ("cancelled", a_name),
            ]
        );
        assert_eq!(sink.completions(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_still_completes() {
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(
            Arc::new(FakeUploader::default()),
            Arc::new(FakePipeline::default()),
            sink.clone(),
        );

        let summary = orch.run_batch().await.unwrap();
        assert_eq!(
            summary,
            BatchSummary {
                elapsed: summary.elapsed,
                ..Default::default()
            }
        );
        assert_eq!(sink.completions(), 1);
    }
}
