//! Wiring for a simulated acquisition station.
//!
//! Builds the mock stage and camera from configuration, puts them behind
//! the device facade, and assembles the stores, engine and scheduler.

use std::sync::Arc;
use std::time::Duration;

use daq_core::{NewJob, ParameterMap};
use daq_experiment::{
    InMemoryImageStore, InMemoryJobStore, JobEngine, JobScheduler, PositionStore,
    TracingProgressSink,
};
use daq_hardware::{DeviceFacade, Instrument, MockCamera, MockStage};
use serde_json::Value;
use tracing::info;

use crate::config::{AppConfig, CameraConfig};

/// Mock stage and camera behind one facade.
pub type SimulatedInstrument = Instrument<MockStage, MockCamera>;

/// Everything needed to run jobs in-process.
pub struct Station {
    /// Device facade implementation
    pub instrument: Arc<SimulatedInstrument>,
    /// Job records
    pub jobs: Arc<InMemoryJobStore>,
    /// Captured image records
    pub images: Arc<InMemoryImageStore>,
    /// Saved stage positions
    pub positions: Arc<PositionStore>,
    /// Job front door
    pub scheduler: JobScheduler,
    camera: CameraConfig,
}

impl Station {
    /// Assemble a station from validated configuration.
    pub fn simulated(config: &AppConfig) -> Self {
        let stage = MockStage::with_timing(
            config.stage.speed_steps_per_sec,
            Duration::from_millis(config.stage.settle_ms),
        );
        let camera = MockCamera::new(config.camera.width, config.camera.height)
            .with_extension(config.camera.file_extension.clone());
        let instrument = Arc::new(Instrument::new(stage, camera, config.limits));

        let jobs = Arc::new(InMemoryJobStore::new());
        let images = Arc::new(InMemoryImageStore::new());
        let facade: Arc<dyn DeviceFacade> = instrument.clone();
        let engine = JobEngine::new(
            facade,
            jobs.clone(),
            images.clone(),
            Arc::new(TracingProgressSink),
            config.limits,
        )
        .with_config(config.engine.clone());

        info!(
            name = %config.application.name,
            resolution = ?(config.camera.width, config.camera.height),
            "Simulated station ready"
        );

        Self {
            instrument,
            jobs,
            images,
            positions: Arc::new(PositionStore::new(config.limits)),
            scheduler: JobScheduler::new(Arc::new(engine)),
            camera: config.camera.clone(),
        }
    }

    /// Job request with the configured exposure and gain filled in where
    /// the caller left them out.
    pub fn job_request(
        &self,
        name: impl Into<String>,
        job_type: daq_core::JobType,
        mut parameters: ParameterMap,
    ) -> NewJob {
        apply_capture_defaults(&mut parameters, &self.camera);
        NewJob::new(name, job_type, parameters)
    }
}

/// Insert configured exposure and gain when absent.
pub fn apply_capture_defaults(parameters: &mut ParameterMap, camera: &CameraConfig) {
    parameters
        .entry("exposure")
        .or_insert_with(|| Value::from(camera.default_exposure_ms));
    parameters
        .entry("gain")
        .or_insert_with(|| Value::from(camera.default_gain));
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::{DaqError, JobStatus, JobType, Position};
    use daq_experiment::NewPosition;
    use serde_json::json;

    #[test]
    fn test_capture_defaults_do_not_override() {
        let camera = CameraConfig {
            default_exposure_ms: 25.0,
            default_gain: 2.0,
            ..CameraConfig::default()
        };
        let mut params = json!({"exposure": 5.0}).as_object().cloned().unwrap();
        apply_capture_defaults(&mut params, &camera);
        assert_eq!(params["exposure"], json!(5.0));
        assert_eq!(params["gain"], json!(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_station_runs_zstack() {
        let mut config = AppConfig::default();
        config.camera.file_extension = "tiff".to_string();
        let station = Station::simulated(&config);

        let request = station.job_request(
            "focus",
            JobType::Zstack,
            json!({"end_z": 100}).as_object().cloned().unwrap(),
        );
        let job = station.scheduler.create(request).await.unwrap();
        let done = station.scheduler.run(job.id).await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 3);
        let images = station.images.for_job(job.id);
        assert_eq!(images.len(), 3);
        assert!(images[0].filename.ends_with(".tiff"));
        assert_eq!((images[0].width, images[0].height), (1920, 1080));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_positions_use_configured_limits() {
        let mut config = AppConfig::default();
        config.limits.y.max = 2_000.0;
        let station = Station::simulated(&config);

        let rejected = station
            .positions
            .save(NewPosition::new("off slide", Position::new(0.0, 2_500.0, 0.0)));
        assert!(matches!(rejected, Err(DaqError::SafetyLimit(_))));

        let slide = station
            .positions
            .save(NewPosition::new("slide", Position::new(500.0, 1_500.0, 20.0)))
            .unwrap();
        let reached = station
            .positions
            .goto(slide.id, station.instrument.as_ref())
            .await
            .unwrap();
        assert_eq!(reached, slide.position);
    }
}
