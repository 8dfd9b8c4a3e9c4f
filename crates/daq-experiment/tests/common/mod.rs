//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daq_core::{
    AppResult, CapturedImage, ControlRequest, DaqError, ImageId, ImageRef, Job, JobId, JobStatus,
    JobType, JobUpdate, NewJob, StageLimits,
};
use daq_experiment::{
    EngineConfig, ImageStore, InMemoryImageStore, InMemoryJobStore, JobEngine, JobStore,
    ProgressSink, RecordingProgressSink,
};
use daq_hardware::{DeviceFacade, Instrument, MockCamera, MockStage};
use serde_json::Value;

pub type MockInstrument = Instrument<MockStage, MockCamera>;

/// Mock device, in-memory stores and a recording sink wired to one engine.
pub struct Rig {
    pub device: Arc<MockInstrument>,
    pub jobs: Arc<InMemoryJobStore>,
    pub images: Arc<InMemoryImageStore>,
    pub sink: Arc<RecordingProgressSink>,
    pub engine: Arc<JobEngine>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with(StageLimits::default(), EngineConfig::default())
    }

    pub fn with(limits: StageLimits, config: EngineConfig) -> Self {
        let jobs = Arc::new(InMemoryJobStore::new());
        let images = Arc::new(InMemoryImageStore::new());
        let sink = Arc::new(RecordingProgressSink::new());
        Self::assemble(limits, config, jobs, images.clone(), images, sink.clone(), sink)
    }

    /// Rig whose engine writes images and notifications to the given stores.
    pub fn assemble(
        limits: StageLimits,
        config: EngineConfig,
        jobs: Arc<InMemoryJobStore>,
        images: Arc<InMemoryImageStore>,
        image_store: Arc<dyn ImageStore>,
        sink: Arc<RecordingProgressSink>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let device = Arc::new(Instrument::new(
            MockStage::new(),
            MockCamera::new(640, 480),
            StageLimits::default(),
        ));
        let facade: Arc<dyn DeviceFacade> = device.clone();
        let job_store: Arc<dyn JobStore> = jobs.clone();
        let engine = JobEngine::new(facade, job_store, image_store, progress, limits)
            .with_config(config);
        Self {
            device,
            jobs,
            images,
            sink,
            engine: Arc::new(engine),
        }
    }

    pub async fn create(&self, job_type: JobType, params: Value) -> Job {
        let parameters = params.as_object().cloned().unwrap_or_default();
        self.jobs
            .create(NewJob::new(format!("{job_type} test"), job_type, parameters))
            .await
            .unwrap()
    }

    pub async fn job(&self, id: JobId) -> Job {
        self.jobs.load(id).await.unwrap()
    }

    pub fn spawn(&self, id: JobId) -> tokio::task::JoinHandle<AppResult<Job>> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.execute(id).await })
    }

    /// Poll until `predicate` holds for the stored job.
    pub async fn wait_for(&self, id: JobId, predicate: impl Fn(&Job) -> bool) -> Job {
        for _ in 0..10_000 {
            let job = self.job(id).await;
            if predicate(&job) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached the expected state");
    }
}

/// Image store that rejects every write.
pub struct FailingImageStore;

#[async_trait]
impl ImageStore for FailingImageStore {
    async fn create(&self, _image: CapturedImage) -> AppResult<ImageId> {
        Err(DaqError::Store("disk full".into()))
    }
}

/// Sink that asks the store to pause the job once it reports `at` steps.
pub struct PauseAt {
    pub jobs: Arc<InMemoryJobStore>,
    pub at: u32,
    pub inner: Arc<RecordingProgressSink>,
}

#[async_trait]
impl ProgressSink for PauseAt {
    async fn on_image_captured(&self, job_id: JobId, image: &ImageRef) -> AppResult<()> {
        self.inner.on_image_captured(job_id, image).await
    }

    async fn on_job_progress(
        &self,
        job_id: JobId,
        progress: u32,
        total: u32,
        status: JobStatus,
    ) -> AppResult<()> {
        if progress == self.at && status == JobStatus::Running {
            self.jobs
                .apply(job_id, JobUpdate::Control(ControlRequest::Pause))
                .await?;
        }
        self.inner.on_job_progress(job_id, progress, total, status).await
    }
}

pub fn grid_params(end_x: f64, end_y: f64) -> Value {
    serde_json::json!({
        "start_x": 0.0, "end_x": end_x, "step_x": 100.0,
        "start_y": 0.0, "end_y": end_y, "step_y": 100.0,
        "z_position": 10.0,
        "exposure": 10.0
    })
}
