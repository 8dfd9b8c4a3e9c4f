//! Single-device job scheduler.
//!
//! The microscope has one stage and one camera, so at most one job executes
//! at a time. Starting a second job while one is running fails with
//! [`DaqError::DeviceBusy`]. Pause, resume and cancel go straight to the job
//! store, where the engine picks them up.

use std::sync::Arc;

use daq_core::{AppResult, ControlRequest, DaqError, Job, JobId, JobStatus, JobUpdate, NewJob};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::JobEngine;

/// Clears the active slot when the job task ends, even on panic.
struct ActiveJob {
    slot: Arc<Mutex<Option<JobId>>>,
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Front door for creating, running and controlling jobs.
#[derive(Clone)]
pub struct JobScheduler {
    engine: Arc<JobEngine>,
    active: Arc<Mutex<Option<JobId>>>,
}

impl JobScheduler {
    /// Scheduler over `engine`.
    pub fn new(engine: Arc<JobEngine>) -> Self {
        Self {
            engine,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Persist a new pending job.
    pub async fn create(&self, request: NewJob) -> AppResult<Job> {
        let job = self.engine.jobs().create(request).await?;
        info!(job_id = job.id, name = %job.name, job_type = %job.job_type, "Job created");
        Ok(job)
    }

    /// Start a pending job in the background.
    ///
    /// # Errors
    ///
    /// [`DaqError::DeviceBusy`] while another job runs, or the job is
    /// missing or not pending.
    pub async fn start(&self, id: JobId) -> AppResult<JoinHandle<AppResult<Job>>> {
        let claim = self.claim(id)?;
        let job = self.engine.jobs().load(id).await?;
        if job.status != JobStatus::Pending {
            return Err(DaqError::InvalidTransition {
                from: job.status,
                to: JobStatus::Running,
            });
        }

        let engine = Arc::clone(&self.engine);
        Ok(tokio::spawn(async move {
            let _claim = claim;
            engine.execute(id).await
        }))
    }

    /// Create and start in one call.
    ///
    /// If another job claims the device between creation and start, the new
    /// job is cancelled so no pending record is left behind.
    pub async fn submit(&self, request: NewJob) -> AppResult<(Job, JoinHandle<AppResult<Job>>)> {
        if let Some(active) = self.active_job() {
            return Err(DaqError::DeviceBusy { active });
        }
        let job = self.create(request).await?;
        match self.start(job.id).await {
            Ok(handle) => Ok((job, handle)),
            Err(err) => {
                if let Err(e) = self.cancel(job.id).await {
                    warn!(job_id = job.id, error = %e, "failed to withdraw unstarted job");
                }
                Err(err)
            }
        }
    }

    /// Start a job and wait for it to finish.
    pub async fn run(&self, id: JobId) -> AppResult<Job> {
        self.start(id)
            .await?
            .await
            .map_err(|e| DaqError::JobInvariant(format!("job task for {id} aborted: {e}")))?
    }

    /// Ask a running job to pause after its current step.
    pub async fn pause(&self, id: JobId) -> AppResult<Job> {
        self.control(id, ControlRequest::Pause).await
    }

    /// Resume a paused job.
    pub async fn resume(&self, id: JobId) -> AppResult<Job> {
        self.control(id, ControlRequest::Resume).await
    }

    /// Cancel a pending, running or paused job.
    pub async fn cancel(&self, id: JobId) -> AppResult<Job> {
        self.control(id, ControlRequest::Cancel).await
    }

    /// Fetch one job.
    pub async fn get(&self, id: JobId) -> AppResult<Job> {
        self.engine.jobs().load(id).await
    }

    /// List jobs, optionally by status.
    pub async fn list(&self, status: Option<JobStatus>) -> AppResult<Vec<Job>> {
        self.engine.jobs().list(status).await
    }

    /// Job currently holding the device.
    pub fn active_job(&self) -> Option<JobId> {
        *self.active.lock()
    }

    /// Whether a job holds the device.
    pub fn is_busy(&self) -> bool {
        self.active_job().is_some()
    }

    fn claim(&self, id: JobId) -> AppResult<ActiveJob> {
        let mut slot = self.active.lock();
        if let Some(active) = *slot {
            return Err(DaqError::DeviceBusy { active });
        }
        *slot = Some(id);
        Ok(ActiveJob {
            slot: Arc::clone(&self.active),
        })
    }

    async fn control(&self, id: JobId, request: ControlRequest) -> AppResult<Job> {
        let job = self
            .engine
            .jobs()
            .apply(id, JobUpdate::Control(request))
            .await?;
        info!(job_id = id, ?request, status = %job.status, "Control request applied");
        Ok(job)
    }
}
