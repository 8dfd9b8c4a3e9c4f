//! Job records and the job status state machine.
//!
//! A job's `status` has two writers: the execution engine, which drives the
//! lifecycle (pending -> running -> terminal), and an external control actor,
//! which requests pause, resume and cancel. The two are kept apart as
//! [`LifecycleUpdate`] and [`ControlRequest`] and only merged when a store
//! applies a [`JobUpdate`] to the stored record. [`Job::apply`] enforces the
//! transition table, so an engine write can never overwrite a pause or
//! cancellation it has not observed yet.
//!
//! ```text
//! Pending --> Running --> Completed
//!    |          |  ^  \-> Failed
//!    |          v  |
//!    |        Paused ---> Failed
//!    |          |
//!    +----------+-------> Cancelled
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};

/// Job identifier assigned by the job store.
pub type JobId = u64;

/// Open key-value parameters, interpreted by the step generator for the job type.
pub type ParameterMap = serde_json::Map<String, serde_json::Value>;

/// Kind of acquisition sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Camera-only captures at a fixed interval.
    Timelapse,
    /// Raster over an XY grid at a fixed Z.
    Grid,
    /// Focus series at a fixed XY.
    Zstack,
    /// Operator-driven session; no automatic steps.
    Manual,
}

impl JobType {
    /// Wire name of the job type.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Timelapse => "timelapse",
            JobType::Grid => "grid",
            JobType::Zstack => "zstack",
            JobType::Manual => "manual",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timelapse" => Ok(JobType::Timelapse),
            "grid" => Ok(JobType::Grid),
            "zstack" => Ok(JobType::Zstack),
            "manual" => Ok(JobType::Manual),
            other => Err(DaqError::UnknownJobType(other.to_string())),
        }
    }
}

/// Job status as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet started.
    Pending,
    /// Engine is executing steps.
    Running,
    /// Suspended between steps by an external request.
    Paused,
    /// All steps executed.
    Completed,
    /// Aborted by a hard error.
    Failed,
    /// Stopped by an external request.
    Cancelled,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Transition table of the job state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Failed)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(DaqError::Parameter(format!("unknown job status '{other}'"))),
        }
    }
}

/// Request to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Human readable name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Sequence type.
    pub job_type: JobType,
    /// Type-specific parameters.
    #[serde(default)]
    pub parameters: ParameterMap,
}

impl NewJob {
    /// Create a request with no description.
    pub fn new(name: impl Into<String>, job_type: JobType, parameters: ParameterMap) -> Self {
        Self {
            name: name.into(),
            description: None,
            job_type,
            parameters,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A unit of automated acquisition work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: JobId,
    /// Human readable name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Sequence type.
    pub job_type: JobType,
    /// Current status.
    pub status: JobStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the engine started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Steps executed so far.
    pub progress: u32,
    /// Total steps, known once the generator is built.
    pub total_steps: Option<u32>,
    /// Type-specific parameters.
    pub parameters: ParameterMap,
    /// Set only when the job failed.
    pub error_message: Option<String>,
    /// Device operation retries performed for this job.
    pub retry_count: u32,
}

impl Job {
    /// Build a pending job from a creation request.
    pub fn new(id: JobId, request: NewJob) -> Self {
        Self {
            id,
            name: request.name,
            description: request.description,
            job_type: request.job_type,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            total_steps: None,
            parameters: request.parameters,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Apply a single field update, enforcing the job invariants.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, update: &JobUpdate) -> AppResult<()> {
        match update {
            JobUpdate::Lifecycle(lifecycle) => self.apply_lifecycle(lifecycle),
            JobUpdate::Control(request) => self.apply_control(*request),
        }
    }

    fn apply_lifecycle(&mut self, update: &LifecycleUpdate) -> AppResult<()> {
        match update {
            LifecycleUpdate::Started { at } => {
                self.transition(JobStatus::Running)?;
                self.started_at = Some(*at);
            }
            LifecycleUpdate::TotalSteps(total) => match self.total_steps {
                Some(existing) if existing != *total => {
                    return Err(DaqError::JobInvariant(format!(
                        "total_steps already fixed at {existing}, refusing {total}"
                    )));
                }
                _ => self.total_steps = Some(*total),
            },
            LifecycleUpdate::Progress(progress) => {
                if *progress < self.progress {
                    return Err(DaqError::JobInvariant(format!(
                        "progress may not decrease ({} -> {progress})",
                        self.progress
                    )));
                }
                if let Some(total) = self.total_steps {
                    if *progress > total {
                        return Err(DaqError::JobInvariant(format!(
                            "progress {progress} exceeds total_steps {total}"
                        )));
                    }
                }
                self.progress = *progress;
            }
            LifecycleUpdate::Retried(count) => {
                self.retry_count = self.retry_count.saturating_add(*count);
            }
            LifecycleUpdate::Finished {
                status,
                error_message,
                at,
            } => {
                if !status.is_terminal() {
                    return Err(DaqError::JobInvariant(format!(
                        "finish requires a terminal status, got {status}"
                    )));
                }
                // A cancellation written by the control actor is acknowledged
                // by the engine with a second, timestamp-only write.
                if !(self.status == JobStatus::Cancelled && *status == JobStatus::Cancelled) {
                    self.transition(*status)?;
                }
                if *status == JobStatus::Failed {
                    self.error_message = error_message.clone();
                }
                if self.completed_at.is_none() {
                    self.completed_at = Some(*at);
                }
            }
        }
        Ok(())
    }

    fn apply_control(&mut self, request: ControlRequest) -> AppResult<()> {
        let target = request.target_status();
        if self.status == target {
            return Ok(());
        }
        // Resume is only meaningful for a paused job.
        if request == ControlRequest::Resume && self.status != JobStatus::Paused {
            return Err(DaqError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        let was_pending = self.status == JobStatus::Pending;
        self.transition(target)?;
        if was_pending && target == JobStatus::Cancelled {
            // No engine will ever observe this job.
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DaqError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// External control request, written by whoever supervises a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlRequest {
    /// Suspend before the next step.
    Pause,
    /// Continue a paused job.
    Resume,
    /// Stop before the next step.
    Cancel,
}

impl ControlRequest {
    /// Status the request writes.
    pub fn target_status(&self) -> JobStatus {
        match self {
            ControlRequest::Pause => JobStatus::Paused,
            ControlRequest::Resume => JobStatus::Running,
            ControlRequest::Cancel => JobStatus::Cancelled,
        }
    }

    /// Map an externally requested status onto a control request.
    pub fn from_status(status: JobStatus) -> AppResult<Self> {
        match status {
            JobStatus::Paused => Ok(ControlRequest::Pause),
            JobStatus::Running => Ok(ControlRequest::Resume),
            JobStatus::Cancelled => Ok(ControlRequest::Cancel),
            other => Err(DaqError::Parameter(format!(
                "status '{other}' cannot be requested externally"
            ))),
        }
    }
}

/// Engine-owned field writes.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleUpdate {
    /// Pending -> Running.
    Started {
        /// Start time.
        at: DateTime<Utc>,
    },
    /// Fix the step count.
    TotalSteps(u32),
    /// Record executed steps.
    Progress(u32),
    /// Add device retries to the counter.
    Retried(u32),
    /// Move to a terminal status.
    Finished {
        /// Terminal status.
        status: JobStatus,
        /// Failure reason, stored only for `Failed`.
        error_message: Option<String>,
        /// Completion time.
        at: DateTime<Utc>,
    },
}

/// A single atomic write against a stored job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Written by the execution engine.
    Lifecycle(LifecycleUpdate),
    /// Written by an external control actor.
    Control(ControlRequest),
}
