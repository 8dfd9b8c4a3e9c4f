use daq_core::{AppResult, CaptureSettings, JobId, JobType, ParameterMap, TargetPosition};
use serde::{Deserialize, Serialize};

use super::params::{axis_point, check_settings, inclusive_count, parse, require_finite};
use super::StepGenerator;
use crate::step::AcquisitionStep;

/// Z-stack parameters. Missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZStackParams {
    /// First focal plane.
    pub start_z: f64,
    /// Last focal plane, inclusive.
    pub end_z: f64,
    /// Z spacing.
    pub step_z: f64,
    /// Fixed X for the stack.
    pub x_position: f64,
    /// Fixed Y for the stack.
    pub y_position: f64,
    /// Exposure in milliseconds.
    pub exposure: f64,
    /// Gain multiplier.
    pub gain: f64,
}

impl Default for ZStackParams {
    fn default() -> Self {
        Self {
            start_z: 0.0,
            end_z: 1000.0,
            step_z: 50.0,
            x_position: 0.0,
            y_position: 0.0,
            exposure: 100.0,
            gain: 1.0,
        }
    }
}

/// Focus series at one XY position.
///
/// Only the first step carries X and Y; later steps move Z alone.
#[derive(Debug, Clone)]
pub struct ZStackPlan {
    job_id: JobId,
    params: ZStackParams,
    total: u32,
}

impl ZStackPlan {
    /// Validate `params` and size the plan.
    pub fn new(job_id: JobId, params: ZStackParams) -> AppResult<Self> {
        let total = inclusive_count("z", params.start_z, params.end_z, params.step_z)?;
        require_finite("x_position", params.x_position)?;
        require_finite("y_position", params.y_position)?;
        check_settings(params.exposure, params.gain)?;
        Ok(Self {
            job_id,
            params,
            total,
        })
    }

    /// Parse and validate a job's parameter map.
    pub fn from_parameters(job_id: JobId, params: &ParameterMap) -> AppResult<Self> {
        Self::new(job_id, parse(JobType::Zstack, params)?)
    }
}

impl StepGenerator for ZStackPlan {
    fn job_type(&self) -> JobType {
        JobType::Zstack
    }

    fn total_steps(&self) -> u32 {
        self.total
    }

    fn step_at(&self, index: u32) -> Option<AcquisitionStep> {
        if index >= self.total {
            return None;
        }
        let p = &self.params;
        let z = axis_point(p.start_z, p.step_z, index, p.end_z);
        let target = if index == 0 {
            TargetPosition::xyz(p.x_position, p.y_position, z)
        } else {
            TargetPosition::z_only(z)
        };
        Some(AcquisitionStep {
            index,
            target,
            settings: CaptureSettings {
                exposure_ms: p.exposure,
                gain: p.gain,
            },
            stem: format!("zstack_{}_z{z}", self.job_id),
        })
    }
}
