//! Job execution engine.
//!
//! Drives one job from `Pending` to a terminal status: builds the step
//! generator, walks its steps, and for each one validates the target, moves
//! the stage, captures and persists the frame, then records progress.
//!
//! Control is cooperative. Pause and cancel are written to the job store by
//! other actors; the engine re-reads the stored status before every step and
//! while pacing a timelapse, and never holds a cached copy across steps.
//! A paused job resumes at the first step not yet executed.
//!
//! Failure handling:
//! - a capture error is soft: logged, reported, and the job continues
//! - a limit violation, motion error, device timeout or store error is hard:
//!   the job is marked `Failed` with the error message
//!
//! `execute` only returns `Err` when the job cannot be started (missing or
//! not pending) or when the job store itself fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use daq_core::{
    AppResult, CapturedImage, DaqError, ImageDescriptor, ImageRef, Job, JobId, JobStatus,
    JobUpdate, LifecycleUpdate, Position, StageLimits, TargetPosition,
};
use daq_hardware::{execute_with_timeout, CaptureRequest, DeviceFacade};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::plans::{GeneratorRegistry, Steps};
use crate::progress::ProgressSink;
use crate::retry::{retry_device_op, RetryPolicy};
use crate::step::{AcquisitionStep, StepOutcome};
use crate::store::{ImageStore, JobStore};

/// Engine timing and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for one stage move, including settling.
    pub move_timeout_ms: u64,
    /// Upper bound for one capture.
    pub capture_timeout_ms: u64,
    /// How often a paused job re-reads its status.
    pub pause_poll_interval_ms: u64,
    /// Retry policy for device operations.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_timeout_ms: 30_000,
            capture_timeout_ms: 30_000,
            pause_poll_interval_ms: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Stage move timeout.
    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    /// Capture timeout.
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Status poll interval while paused or pacing.
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    /// Reject zero timeouts and poll intervals.
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("move_timeout_ms", self.move_timeout_ms),
            ("capture_timeout_ms", self.capture_timeout_ms),
            ("pause_poll_interval_ms", self.pause_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(DaqError::Configuration(format!(
                    "engine.{name} must be greater than zero"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(DaqError::Configuration(
                "engine.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the engine should do after reading the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clearance {
    Proceed,
    Cancelled,
}

/// How the step loop ended.
#[derive(Debug)]
enum RunOutcome {
    Completed,
    Cancelled,
    Failed(DaqError),
}

fn lifecycle(update: LifecycleUpdate) -> JobUpdate {
    JobUpdate::Lifecycle(update)
}

fn finished(status: JobStatus, error_message: Option<String>) -> JobUpdate {
    lifecycle(LifecycleUpdate::Finished {
        status,
        error_message,
        at: Utc::now(),
    })
}

/// Runs acquisition jobs against one device.
pub struct JobEngine {
    device: Arc<dyn DeviceFacade>,
    jobs: Arc<dyn JobStore>,
    images: Arc<dyn ImageStore>,
    sink: Arc<dyn ProgressSink>,
    limits: StageLimits,
    generators: GeneratorRegistry,
    config: EngineConfig,
}

impl JobEngine {
    /// Engine with default timing and the built-in generators.
    pub fn new(
        device: Arc<dyn DeviceFacade>,
        jobs: Arc<dyn JobStore>,
        images: Arc<dyn ImageStore>,
        sink: Arc<dyn ProgressSink>,
        limits: StageLimits,
    ) -> Self {
        Self {
            device,
            jobs,
            images,
            sink,
            limits,
            generators: GeneratorRegistry::default(),
            config: EngineConfig::default(),
        }
    }

    /// Replace timing and retry settings.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the generator registry.
    pub fn with_generators(mut self, generators: GeneratorRegistry) -> Self {
        self.generators = generators;
        self
    }

    /// Job store shared with control actors.
    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Active settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run job `id` to a terminal status and return the final record.
    ///
    /// # Errors
    ///
    /// [`DaqError::JobNotFound`] or [`DaqError::InvalidTransition`] if the
    /// job cannot be started, in which case it is left untouched. Store
    /// failures while finalizing are also returned. Every other failure is
    /// recorded on the job as `Failed`.
    #[instrument(skip(self), fields(job_id = id))]
    pub async fn execute(&self, id: JobId) -> AppResult<Job> {
        let job = self.jobs.load(id).await?;
        if job.status != JobStatus::Pending {
            return Err(DaqError::InvalidTransition {
                from: job.status,
                to: JobStatus::Running,
            });
        }

        let job = self
            .jobs
            .apply(id, lifecycle(LifecycleUpdate::Started { at: Utc::now() }))
            .await?;
        info!(name = %job.name, job_type = %job.job_type, "Starting job");

        let outcome = match self.run_steps(&job).await {
            Ok(outcome) => outcome,
            Err(err) => RunOutcome::Failed(err),
        };

        let job = self.finalize(id, outcome).await?;
        self.report_progress(&job).await;
        Ok(job)
    }

    async fn run_steps(&self, job: &Job) -> AppResult<RunOutcome> {
        let generator = self.generators.create(job)?;
        let total = generator.total_steps();
        let planned = self
            .jobs
            .apply(job.id, lifecycle(LifecycleUpdate::TotalSteps(total)))
            .await?;
        info!(total_steps = total, "Acquisition plan ready");
        self.report_progress(&planned).await;

        for step in Steps::new(generator.as_ref()) {
            if self.await_clearance(job.id).await? == Clearance::Cancelled {
                return Ok(RunOutcome::Cancelled);
            }

            match self.execute_step(job.id, &step).await {
                StepOutcome::Captured(image) => {
                    debug!(step = step.index, filename = %image.filename, "step captured");
                }
                StepOutcome::SoftFailure(reason) => {
                    warn!(step = step.index, %reason, "Capture failed, continuing with next step");
                    if let Err(e) = self.sink.on_step_failed(job.id, step.index, &reason).await {
                        warn!(error = %e, "progress sink rejected step failure");
                    }
                }
                StepOutcome::HardFailure(err) => {
                    return Ok(RunOutcome::Failed(err));
                }
            }

            let executed = step.index + 1;
            let updated = self
                .jobs
                .apply(job.id, lifecycle(LifecycleUpdate::Progress(executed)))
                .await?;
            self.report_progress(&updated).await;

            if let Some(interval) = generator.pacing() {
                if executed < total && self.pace(job.id, interval).await? == Clearance::Cancelled {
                    return Ok(RunOutcome::Cancelled);
                }
            }
        }

        Ok(RunOutcome::Completed)
    }

    /// Validate, move, capture and persist one step.
    async fn execute_step(&self, job_id: JobId, step: &AcquisitionStep) -> StepOutcome {
        if let Err(violation) = self.limits.validate(&step.target) {
            warn!(step = step.index, %violation, "Step target rejected by safety limits");
            return StepOutcome::HardFailure(violation.into());
        }

        let position = if step.target.is_unchanged() {
            execute_with_timeout(
                "position query",
                self.config.move_timeout(),
                self.device.current_position(),
            )
            .await
        } else {
            self.move_stage(job_id, step.target).await
        };
        let position = match position {
            Ok(position) => position,
            Err(err) => return StepOutcome::HardFailure(err),
        };

        let request = CaptureRequest {
            settings: step.settings,
            stem: step.stem.clone(),
        };
        let descriptor = match self.capture(job_id, &request).await {
            Ok(descriptor) => descriptor,
            // A camera that stops answering is treated like a stalled stage.
            Err(err @ DaqError::DeviceTimeout { .. }) => return StepOutcome::HardFailure(err),
            Err(err) => return StepOutcome::SoftFailure(err.to_string()),
        };

        let image = CapturedImage::new(job_id, descriptor, position, step.settings);
        let filename = image.filename.clone();
        let image_id = match self.images.create(image).await {
            Ok(id) => id,
            Err(err) => return StepOutcome::HardFailure(err),
        };

        let image = ImageRef {
            id: image_id,
            filename,
        };
        if let Err(e) = self.sink.on_image_captured(job_id, &image).await {
            warn!(error = %e, "progress sink rejected image notification");
        }
        StepOutcome::Captured(image)
    }

    async fn move_stage(&self, job_id: JobId, target: TargetPosition) -> AppResult<Position> {
        let device = &self.device;
        let timeout = self.config.move_timeout();
        let attempt = retry_device_op(&self.config.retry, "stage move", move || {
            execute_with_timeout("stage move", timeout, device.move_to(target, false))
        })
        .await;
        self.record_retries(job_id, attempt.retries).await;
        attempt.result
    }

    async fn capture(&self, job_id: JobId, request: &CaptureRequest) -> AppResult<ImageDescriptor> {
        let device = &self.device;
        let timeout = self.config.capture_timeout();
        let attempt = retry_device_op(&self.config.retry, "camera capture", move || {
            execute_with_timeout("camera capture", timeout, device.capture(request))
        })
        .await;
        self.record_retries(job_id, attempt.retries).await;
        attempt.result
    }

    async fn record_retries(&self, job_id: JobId, retries: u32) {
        if retries == 0 {
            return;
        }
        if let Err(e) = self
            .jobs
            .apply(job_id, lifecycle(LifecycleUpdate::Retried(retries)))
            .await
        {
            warn!(error = %e, "failed to record retry count");
        }
    }

    /// Block while the job is paused. Returns once it is running again or
    /// has been cancelled.
    async fn await_clearance(&self, id: JobId) -> AppResult<Clearance> {
        let mut paused = false;
        loop {
            match self.jobs.load(id).await?.status {
                JobStatus::Running => {
                    if paused {
                        info!("Job resumed");
                    }
                    return Ok(Clearance::Proceed);
                }
                JobStatus::Cancelled => {
                    info!("Cancellation observed");
                    return Ok(Clearance::Cancelled);
                }
                JobStatus::Paused => {
                    if !paused {
                        info!("Job paused, waiting for resume");
                        paused = true;
                    }
                    sleep(self.config.pause_poll_interval()).await;
                }
                other => {
                    return Err(DaqError::JobInvariant(format!(
                        "job status changed to {other} outside the engine"
                    )))
                }
            }
        }
    }

    /// Wait `interval` between timelapse captures, waking every poll
    /// interval to check for cancellation.
    async fn pace(&self, id: JobId, interval: Duration) -> AppResult<Clearance> {
        let deadline = Instant::now() + interval;
        let poll = self.config.pause_poll_interval();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Clearance::Proceed);
            }
            sleep((deadline - now).min(poll)).await;
            if self.jobs.load(id).await?.status == JobStatus::Cancelled {
                info!("Cancellation observed while waiting for next capture");
                return Ok(Clearance::Cancelled);
            }
        }
    }

    /// Write the terminal status. The store has the final say: a completion
    /// that races a pause waits for the resume, and a cancel always wins.
    async fn finalize(&self, id: JobId, outcome: RunOutcome) -> AppResult<Job> {
        match outcome {
            RunOutcome::Completed => loop {
                match self.jobs.apply(id, finished(JobStatus::Completed, None)).await {
                    Ok(job) => {
                        info!(progress = job.progress, "Job completed successfully");
                        return Ok(job);
                    }
                    Err(DaqError::InvalidTransition {
                        from: JobStatus::Paused,
                        ..
                    }) => {
                        if self.await_clearance(id).await? == Clearance::Cancelled {
                            return self.acknowledge_cancel(id).await;
                        }
                    }
                    Err(DaqError::InvalidTransition {
                        from: JobStatus::Cancelled,
                        ..
                    }) => return self.acknowledge_cancel(id).await,
                    Err(err) => return Err(err),
                }
            },
            RunOutcome::Cancelled => self.acknowledge_cancel(id).await,
            RunOutcome::Failed(err) => {
                let message = err.to_string();
                error!(error = %message, "Job failed");
                match self
                    .jobs
                    .apply(id, finished(JobStatus::Failed, Some(message)))
                    .await
                {
                    Ok(job) => Ok(job),
                    Err(DaqError::InvalidTransition {
                        from: JobStatus::Cancelled,
                        ..
                    }) => self.acknowledge_cancel(id).await,
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn acknowledge_cancel(&self, id: JobId) -> AppResult<Job> {
        let job = self
            .jobs
            .apply(id, finished(JobStatus::Cancelled, None))
            .await?;
        info!(progress = job.progress, "Job cancelled");
        Ok(job)
    }

    async fn report_progress(&self, job: &Job) {
        let total = job.total_steps.unwrap_or(0);
        if let Err(e) = self
            .sink
            .on_job_progress(job.id, job.progress, total, job.status)
            .await
        {
            warn!(error = %e, "progress sink rejected progress update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgressSink;
    use crate::store::{InMemoryImageStore, InMemoryJobStore};
    use daq_core::{JobType, NewJob};
    use daq_hardware::{Instrument, MockCamera, MockStage};
    use tracing_test::traced_test;

    fn engine() -> (JobEngine, Arc<InMemoryJobStore>, Arc<Instrument<MockStage, MockCamera>>) {
        let device = Arc::new(Instrument::new(
            MockStage::new(),
            MockCamera::new(64, 48),
            StageLimits::default(),
        ));
        let jobs = Arc::new(InMemoryJobStore::new());
        let engine = JobEngine::new(
            device.clone(),
            jobs.clone(),
            Arc::new(InMemoryImageStore::new()),
            Arc::new(RecordingProgressSink::new()),
            StageLimits::default(),
        );
        (engine, jobs, device)
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_soft_failure_is_logged() {
        let (engine, jobs, device) = engine();
        device.camera().fail_on_capture(1);
        let params = serde_json::json!({"end_x": 100, "end_y": 0});
        let job = jobs
            .create(NewJob::new(
                "logged",
                JobType::Grid,
                params.as_object().cloned().unwrap(),
            ))
            .await
            .unwrap();

        let done = engine.execute(job.id).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert!(logs_contain("Capture failed, continuing with next step"));
        assert!(logs_contain("Job completed successfully"));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_failure_reason_is_logged() {
        let (engine, jobs, _device) = engine();
        let job = jobs
            .create(NewJob::new("manual", JobType::Manual, Default::default()))
            .await
            .unwrap();

        let done = engine.execute(job.id).await.unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        assert!(logs_contain("Unknown job type: manual"));
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.move_timeout(), Duration::from_secs(30));
        assert_eq!(config.pause_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let config = EngineConfig {
            capture_timeout_ms: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("engine.capture_timeout_ms"));

        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 0,
                backoff_ms: 0,
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"move_timeout_ms": 1000, "retry": {"max_attempts": 3}}"#)
                .unwrap();
        assert_eq!(config.move_timeout_ms, 1000);
        assert_eq!(config.capture_timeout_ms, 30_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_ms, 100);
    }
}
