use std::time::Duration;

use daq_core::{AppResult, CaptureSettings, DaqError, JobId, JobType, ParameterMap, TargetPosition};
use serde::{Deserialize, Serialize};

use super::params::{bounded_count, check_settings, parse, require_positive};
use super::StepGenerator;
use crate::step::AcquisitionStep;

/// Timelapse parameters. Missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelapseParams {
    /// Seconds between captures.
    #[serde(alias = "interval")]
    pub interval_seconds: f64,
    /// Total duration in seconds.
    #[serde(alias = "duration")]
    pub duration_seconds: f64,
    /// Exposure in milliseconds.
    pub exposure: f64,
    /// Gain multiplier.
    pub gain: f64,
}

impl Default for TimelapseParams {
    fn default() -> Self {
        Self {
            interval_seconds: 60.0,
            duration_seconds: 3600.0,
            exposure: 100.0,
            gain: 1.0,
        }
    }
}

/// `floor(duration / interval)` captures at the current stage position.
#[derive(Debug, Clone)]
pub struct TimelapsePlan {
    job_id: JobId,
    params: TimelapseParams,
    interval: Duration,
    total: u32,
}

impl TimelapsePlan {
    /// Validate `params` and size the plan.
    pub fn new(job_id: JobId, params: TimelapseParams) -> AppResult<Self> {
        require_positive("interval_seconds", params.interval_seconds)?;
        require_positive("duration_seconds", params.duration_seconds)?;
        check_settings(params.exposure, params.gain)?;

        let total = bounded_count(
            "timelapse",
            params.duration_seconds / params.interval_seconds,
        )?;
        if total == 0 {
            return Err(DaqError::Parameter(format!(
                "duration_seconds ({}) is shorter than interval_seconds ({}); no captures would be taken",
                params.duration_seconds, params.interval_seconds
            )));
        }
        let interval = Duration::try_from_secs_f64(params.interval_seconds).map_err(|e| {
            DaqError::Parameter(format!(
                "interval_seconds {} is not a usable duration: {e}",
                params.interval_seconds
            ))
        })?;

        Ok(Self {
            job_id,
            params,
            interval,
            total,
        })
    }

    /// Parse and validate a job's parameter map.
    pub fn from_parameters(job_id: JobId, params: &ParameterMap) -> AppResult<Self> {
        Self::new(job_id, parse(JobType::Timelapse, params)?)
    }

    /// Validated parameters.
    pub fn params(&self) -> &TimelapseParams {
        &self.params
    }
}

impl StepGenerator for TimelapsePlan {
    fn job_type(&self) -> JobType {
        JobType::Timelapse
    }

    fn total_steps(&self) -> u32 {
        self.total
    }

    fn step_at(&self, index: u32) -> Option<AcquisitionStep> {
        if index >= self.total {
            return None;
        }
        Some(AcquisitionStep {
            index,
            target: TargetPosition::unchanged(),
            settings: CaptureSettings {
                exposure_ms: self.params.exposure,
                gain: self.params.gain,
            },
            stem: format!("timelapse_{}_{index:04}", self.job_id),
        })
    }

    fn pacing(&self) -> Option<Duration> {
        Some(self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(params: serde_json::Value) -> AppResult<TimelapsePlan> {
        TimelapsePlan::from_parameters(3, params.as_object().unwrap())
    }

    #[test]
    fn test_step_count_floors_duration() {
        let plan = plan(json!({"interval_seconds": 10, "duration_seconds": 35})).unwrap();
        assert_eq!(plan.total_steps(), 3);
        assert_eq!(plan.pacing(), Some(Duration::from_secs(10)));
        assert!(plan.step_at(3).is_none());
    }

    #[test]
    fn test_steps_leave_stage_in_place() {
        let plan = plan(json!({"interval_seconds": 1, "duration_seconds": 2, "exposure": 20})).unwrap();
        let step = plan.step_at(1).unwrap();
        assert_eq!(step.index, 1);
        assert!(step.target.is_unchanged());
        assert_eq!(step.settings.exposure_ms, 20.0);
        assert_eq!(step.stem, "timelapse_3_0001");
    }

    #[test]
    fn test_defaults_apply_to_missing_keys() {
        let plan = plan(json!({})).unwrap();
        assert_eq!(plan.params(), &TimelapseParams::default());
        assert_eq!(plan.total_steps(), 60);
    }

    #[test]
    fn test_short_keys_are_accepted() {
        let plan = plan(json!({"interval": 5, "duration": 20})).unwrap();
        assert_eq!(plan.total_steps(), 4);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            plan(json!({"interval_seconds": 0})),
            Err(DaqError::Parameter(_))
        ));
        assert!(matches!(
            plan(json!({"interval_seconds": 10, "duration_seconds": 5})),
            Err(DaqError::Parameter(_))
        ));
        assert!(matches!(
            plan(json!({"interval_seconds": "ten"})),
            Err(DaqError::Parameter(_))
        ));
        assert!(matches!(
            plan(json!({"gain": -1.0})),
            Err(DaqError::Parameter(_))
        ));
    }
}
