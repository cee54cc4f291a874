//! In-memory job table.
//!
//! All reads and writes of job state go through one mutex. Callers never see
//! the map itself, only cloned snapshots, so a poll cannot observe a
//! half-applied transition.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use rh_core::{JobId, JobStatus, TranscodingJob};
use tokio_util::sync::CancellationToken;

struct Entry {
    job: TranscodingJob,
    cancel: CancellationToken,
}

/// Result of [`JobTable::get_or_create`].
#[derive(Debug)]
pub enum Claim {
    /// An active job already held the ID; nothing was inserted.
    Existing(TranscodingJob),
    /// The job was inserted. The token cancels its work.
    Created(TranscodingJob, CancellationToken),
}

#[derive(Default)]
pub struct JobTable {
    inner: Mutex<HashMap<JobId, Entry>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job` unless an active job holds its ID. Terminal entries are
    /// replaced.
    pub fn get_or_create(&self, job: TranscodingJob) -> Claim {
        let mut map = self.inner.lock();
        if let Some(entry) = map.get(&job.id) {
            if entry.job.status.is_active() {
                return Claim::Existing(entry.job.clone());
            }
        }
        let cancel = CancellationToken::new();
        map.insert(
            job.id.clone(),
            Entry {
                job: job.clone(),
                cancel: cancel.clone(),
            },
        );
        Claim::Created(job, cancel)
    }

    /// Move an active job to `status` and apply `update` under the lock.
    /// Returns `None` if the job is unknown or already terminal.
    pub fn transition(
        &self,
        id: &JobId,
        status: JobStatus,
        update: impl FnOnce(&mut TranscodingJob),
    ) -> Option<TranscodingJob> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id)?;
        if entry.job.status.is_terminal() {
            return None;
        }
        entry.job.status = status;
        update(&mut entry.job);
        Some(entry.job.clone())
    }

    /// Cancel an active job. Unknown IDs give `None`; terminal jobs are
    /// returned unchanged.
    pub fn cancel(&self, id: &JobId) -> Option<TranscodingJob> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id)?;
        if entry.job.status.is_active() {
            entry.cancel.cancel();
            entry.job.status = JobStatus::Cancelled;
            entry.job.finished_at = Some(Utc::now());
        }
        Some(entry.job.clone())
    }

    pub fn get(&self, id: &JobId) -> Option<TranscodingJob> {
        self.inner.lock().get(id).map(|e| e.job.clone())
    }

    /// All jobs, oldest first.
    pub fn snapshot(&self) -> Vec<TranscodingJob> {
        let mut jobs: Vec<TranscodingJob> =
            self.inner.lock().values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }
}
