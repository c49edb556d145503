// src/scheduler.rs

//! Job scheduler: one Tokio task per job, bounded by a semaphore.
//!
//! A job id can only be owned by one worker at a time; submitting or
//! retrying a job that is already running is rejected.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{retry_reset, JobRunner};
use crate::errors::{ClusterdagError, Result};
use crate::model::JobId;
use crate::types::JobState;

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: JobId,
    handle: JoinHandle<Result<JobState>>,
}

impl JobHandle {
    /// Wait for the job's worker and return the final state.
    pub async fn wait(self) -> Result<JobState> {
        self.handle.await.map_err(|e| {
            ClusterdagError::Other(anyhow::anyhow!("job {} worker failed: {e}", self.job_id))
        })?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Removes the job from the running set when the worker ends, including on
/// panic.
#[derive(Debug)]
struct RunningClaim {
    job_id: JobId,
    running: Arc<Mutex<HashSet<JobId>>>,
}

impl Drop for RunningClaim {
    fn drop(&mut self) {
        if let Ok(mut set) = self.running.lock() {
            set.remove(&self.job_id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobScheduler {
    runner: JobRunner,
    running: Arc<Mutex<HashSet<JobId>>>,
    permits: Arc<Semaphore>,
}

impl JobScheduler {
    pub fn new(runner: JobRunner, max_concurrent_jobs: usize) -> Self {
        Self {
            runner,
            running: Arc::new(Mutex::new(HashSet::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn is_running(&self, job_id: JobId) -> bool {
        self.running
            .lock()
            .map(|set| set.contains(&job_id))
            .unwrap_or(false)
    }

    fn claim(&self, job_id: JobId) -> Result<RunningClaim> {
        let mut set = self.running.lock().map_err(|_| {
            ClusterdagError::Other(anyhow::anyhow!("scheduler running set poisoned"))
        })?;
        if !set.insert(job_id) {
            return Err(ClusterdagError::JobAlreadyRunning(job_id));
        }
        Ok(RunningClaim {
            job_id,
            running: Arc::clone(&self.running),
        })
    }

    /// Start executing a persisted `PENDING` job in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, job_id: JobId) -> Result<JobHandle> {
        let claim = self.claim(job_id)?;
        let job = self
            .runner
            .store()
            .job(job_id)?
            .ok_or(ClusterdagError::JobNotFound(job_id))?;
        if job.state != JobState::Pending {
            return Err(ClusterdagError::JobNotPending {
                job_id,
                state: job.state,
            });
        }
        Ok(self.spawn(claim))
    }

    /// Reset a failed job to `PENDING` and run it again.
    ///
    /// The stage and task plan stored at creation time is reused as-is.
    pub fn retry(&self, job_id: JobId) -> Result<JobHandle> {
        let claim = self.claim(job_id)?;

        let snapshot = self.runner.snapshot(job_id)?;
        let batch = retry_reset(&snapshot)?;
        let store = self.runner.store();
        store.update_states(&batch)?;
        let attempt = store.bump_retry_count(job_id)?;

        info!(
            job_id,
            attempt,
            stages = batch.stages.len(),
            tasks = batch.tasks.len(),
            "job reset for retry"
        );
        Ok(self.spawn(claim))
    }

    fn spawn(&self, claim: RunningClaim) -> JobHandle {
        let job_id = claim.job_id;
        let runner = self.runner.clone();
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let _claim = claim;
            let _permit = permits.acquire_owned().await.map_err(|e| {
                ClusterdagError::Other(anyhow::anyhow!("scheduler closed: {e}"))
            })?;
            debug!(job_id, "job worker started");
            runner.run_job(job_id).await
        });

        JobHandle { job_id, handle }
    }
}
