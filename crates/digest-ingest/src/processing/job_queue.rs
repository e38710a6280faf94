//! Ordered store of job records
//!
//! Insertion order is significant and never changed. Readers only ever get
//! owned snapshots; the lock is never held across an `.await`.

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::types::{JobId, JobRecord, JobStatus, SourceFile};

/// Per-status counts over the queue
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub total_jobs: usize,
    pub pending: usize,
    pub uploading: usize,
    pub processing: usize,
    pub complete: usize,
    pub failed: usize,
}

impl QueueStats {
    /// Jobs a new run would attempt
    pub fn eligible(&self) -> usize {
        self.pending + self.failed
    }
}

/// Progress of the active run over the jobs it started with
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchProgress {
    /// Eligible jobs when the run started
    pub total: usize,
    /// Jobs of this run that reached a terminal state
    pub finished: usize,
}

impl BatchProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.finished as f64 / self.total as f64 * 100.0
    }
}

/// Job queue holding records in enqueue order
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: RwLock<Vec<JobRecord>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one pending record per file, in argument order
    pub fn enqueue(&self, files: impl IntoIterator<Item = SourceFile>) -> Vec<JobId> {
        append(&mut self.jobs.write(), files)
    }

    /// Remove a job that is not in flight
    ///
    /// Does not know whether a run is active; callers that share the queue
    /// with an orchestrator go through [`Orchestrator::remove`](super::Orchestrator::remove).
    pub fn remove(&self, job_id: JobId) -> Result<JobRecord> {
        remove_from(&mut self.jobs.write(), job_id)
    }

    /// Drop every completed record, returning how many were removed
    pub fn clear_finished(&self) -> usize {
        retain_unfinished(&mut self.jobs.write())
    }

    /// Owned, order-preserving copy of every record
    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.jobs.read().clone()
    }

    pub fn get(&self, job_id: JobId) -> Option<JobRecord> {
        self.jobs.read().iter().find(|j| j.id == job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let jobs = self.jobs.read();
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();

        QueueStats {
            total_jobs: jobs.len(),
            pending: count(JobStatus::Pending),
            uploading: count(JobStatus::Uploading),
            processing: count(JobStatus::Processing),
            complete: count(JobStatus::Complete),
            failed: count(JobStatus::Failed),
        }
    }

    /// Write lock, unless `running` is set
    ///
    /// The flag is read under the lock, so it cannot flip to set between the
    /// check and the mutation: [`begin_run`](Self::begin_run) sets it under
    /// the same lock.
    fn idle_write(
        &self,
        running: &AtomicBool,
        action: &str,
    ) -> Result<RwLockWriteGuard<'_, Vec<JobRecord>>> {
        let jobs = self.jobs.write();
        if running.load(Ordering::Acquire) {
            return Err(Error::invalid_operation(format!(
                "cannot {} while a batch is running",
                action
            )));
        }
        Ok(jobs)
    }

    pub(crate) fn enqueue_idle(
        &self,
        running: &AtomicBool,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Result<Vec<JobId>> {
        let mut jobs = self.idle_write(running, "enqueue jobs")?;
        Ok(append(&mut jobs, files))
    }

    pub(crate) fn remove_idle(&self, running: &AtomicBool, job_id: JobId) -> Result<JobRecord> {
        let mut jobs = self.idle_write(running, "remove jobs")?;
        remove_from(&mut jobs, job_id)
    }

    pub(crate) fn clear_finished_idle(&self, running: &AtomicBool) -> Result<usize> {
        let mut jobs = self.idle_write(running, "clear jobs")?;
        Ok(retain_unfinished(&mut jobs))
    }

    /// Set `running` and capture each record's id and status, in queue order
    ///
    /// Returns `None` if `running` was already set.
    pub(crate) fn begin_run(&self, running: &AtomicBool) -> Option<Vec<(JobId, JobStatus)>> {
        let jobs = self.jobs.write();
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(jobs.iter().map(|j| (j.id, j.status)).collect())
    }

    /// Apply `f` to a record and return a copy of the result
    ///
    /// Returns `None` if the job no longer exists.
    pub(crate) fn update<F>(&self, job_id: JobId, f: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write();
        let record = jobs.iter_mut().find(|j| j.id == job_id)?;
        f(record);
        Some(record.clone())
    }
}

fn append(jobs: &mut Vec<JobRecord>, files: impl IntoIterator<Item = SourceFile>) -> Vec<JobId> {
    let start = jobs.len();
    jobs.extend(files.into_iter().map(JobRecord::new));

    jobs[start..]
        .iter()
        .map(|record| {
            tracing::debug!(job_id = %record.id, filename = %record.filename(), "Job enqueued");
            record.id
        })
        .collect()
}

fn remove_from(jobs: &mut Vec<JobRecord>, job_id: JobId) -> Result<JobRecord> {
    let index = jobs
        .iter()
        .position(|j| j.id == job_id)
        .ok_or_else(|| Error::invalid_operation(format!("unknown job {}", job_id)))?;

    let status = jobs[index].status;
    if status.is_in_flight() {
        return Err(Error::invalid_operation(format!(
            "job {} is {} and cannot be removed",
            job_id, status
        )));
    }

    Ok(jobs.remove(index))
}

fn retain_unfinished(jobs: &mut Vec<JobRecord>) -> usize {
    let before = jobs.len();
    jobs.retain(|j| j.status != JobStatus::Complete);
    before - jobs.len()
}
