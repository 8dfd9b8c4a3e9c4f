//! Progress notifications.
//!
//! Sinks are best effort: the engine logs and ignores any error they return.

use async_trait::async_trait;
use daq_core::{AppResult, DaqError, ImageRef, JobId, JobStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Event emitted while a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A frame was captured and stored.
    ImageCaptured {
        /// Owning job.
        job_id: JobId,
        /// Stored image.
        image: ImageRef,
    },
    /// Step counter or status changed.
    JobProgress {
        /// Job.
        job_id: JobId,
        /// Steps executed.
        progress: u32,
        /// Planned steps, 0 if the plan was never built.
        total: u32,
        /// Status at the time of the event.
        status: JobStatus,
    },
    /// A capture failed and the job moved on.
    StepFailed {
        /// Job.
        job_id: JobId,
        /// Step index.
        step: u32,
        /// Failure reason.
        reason: String,
    },
}

/// Receiver of progress notifications.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// A frame was captured and stored.
    async fn on_image_captured(&self, job_id: JobId, image: &ImageRef) -> AppResult<()>;

    /// Progress or status changed.
    async fn on_job_progress(
        &self,
        job_id: JobId,
        progress: u32,
        total: u32,
        status: JobStatus,
    ) -> AppResult<()>;

    /// A capture failed and the job continued.
    async fn on_step_failed(&self, _job_id: JobId, _step: u32, _reason: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastProgressSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgressSink {
    /// Channel holding up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscriber; sees events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: ProgressEvent) -> AppResult<()> {
        // No subscribers is not an error.
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|e| DaqError::Notification(e.to_string()))
    }
}

impl Default for BroadcastProgressSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressSink for BroadcastProgressSink {
    async fn on_image_captured(&self, job_id: JobId, image: &ImageRef) -> AppResult<()> {
        self.send(ProgressEvent::ImageCaptured {
            job_id,
            image: image.clone(),
        })
    }

    async fn on_job_progress(
        &self,
        job_id: JobId,
        progress: u32,
        total: u32,
        status: JobStatus,
    ) -> AppResult<()> {
        self.send(ProgressEvent::JobProgress {
            job_id,
            progress,
            total,
            status,
        })
    }

    async fn on_step_failed(&self, job_id: JobId, step: u32, reason: &str) -> AppResult<()> {
        self.send(ProgressEvent::StepFailed {
            job_id,
            step,
            reason: reason.to_string(),
        })
    }
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

#[async_trait]
impl ProgressSink for TracingProgressSink {
    async fn on_image_captured(&self, job_id: JobId, image: &ImageRef) -> AppResult<()> {
        info!(job_id, image_id = image.id, filename = %image.filename, "image captured");
        Ok(())
    }

    async fn on_job_progress(
        &self,
        job_id: JobId,
        progress: u32,
        total: u32,
        status: JobStatus,
    ) -> AppResult<()> {
        info!(job_id, progress, total, %status, "job progress");
        Ok(())
    }

    async fn on_step_failed(&self, job_id: JobId, step: u32, reason: &str) -> AppResult<()> {
        warn!(job_id, step, reason, "step failed");
        Ok(())
    }
}

/// Keeps every event in memory. Can be told to fail, to check that sink
/// errors never reach the job.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
    failing: Mutex<bool>,
}

impl RecordingProgressSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notification return an error (after recording it).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Progress values reported for `job_id`, in order.
    pub fn progress_values(&self, job_id: JobId) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::JobProgress {
                    job_id: id,
                    progress,
                    ..
                } if *id == job_id => Some(*progress),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ProgressEvent) -> AppResult<()> {
        self.events.lock().push(event);
        if *self.failing.lock() {
            return Err(DaqError::Notification("recording sink set to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for RecordingProgressSink {
    async fn on_image_captured(&self, job_id: JobId, image: &ImageRef) -> AppResult<()> {
        self.record(ProgressEvent::ImageCaptured {
            job_id,
            image: image.clone(),
        })
    }

    async fn on_job_progress(
        &self,
        job_id: JobId,
        progress: u32,
        total: u32,
        status: JobStatus,
    ) -> AppResult<()> {
        self.record(ProgressEvent::JobProgress {
            job_id,
            progress,
            total,
            status,
        })
    }

    async fn on_step_failed(&self, job_id: JobId, step: u32, reason: &str) -> AppResult<()> {
        self.record(ProgressEvent::StepFailed {
            job_id,
            step,
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let sink = BroadcastProgressSink::new(8);
        let mut rx = sink.subscribe();
        sink.on_job_progress(1, 2, 6, JobStatus::Running)
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::JobProgress {
                job_id: 1,
                progress: 2,
                total: 6,
                status: JobStatus::Running,
            }
        );
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let sink = BroadcastProgressSink::default();
        assert!(sink.on_step_failed(1, 0, "no frame").await.is_ok());
    }

    #[test]
    fn test_event_wire_format() {
        let event = ProgressEvent::ImageCaptured {
            job_id: 3,
            image: ImageRef {
                id: 10,
                filename: "grid_3_x0_y0.jpg".into(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "image_captured");
        assert_eq!(value["image"]["filename"], "grid_3_x0_y0.jpg");
    }

    #[tokio::test]
    async fn test_recording_sink_failure_mode() {
        let sink = RecordingProgressSink::new();
        sink.set_failing(true);
        assert!(sink.on_job_progress(5, 1, 3, JobStatus::Running).await.is_err());
        assert_eq!(sink.progress_values(5), vec![1]);
    }
}
