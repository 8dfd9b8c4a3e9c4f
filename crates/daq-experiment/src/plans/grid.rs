use daq_core::limits::MAX_JOB_STEPS;
use daq_core::{AppResult, CaptureSettings, DaqError, JobId, JobType, ParameterMap, TargetPosition};
use serde::{Deserialize, Serialize};

use super::params::{axis_point, check_settings, inclusive_count, parse, require_finite};
use super::StepGenerator;
use crate::step::AcquisitionStep;

/// Grid scan parameters. Missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridScanParams {
    /// First X column.
    pub start_x: f64,
    /// Last X column, inclusive.
    pub end_x: f64,
    /// X spacing.
    pub step_x: f64,
    /// First Y row.
    pub start_y: f64,
    /// Last Y row, inclusive.
    pub end_y: f64,
    /// Y spacing.
    pub step_y: f64,
    /// Fixed Z for the whole scan.
    pub z_position: f64,
    /// Exposure in milliseconds.
    pub exposure: f64,
    /// Gain multiplier.
    pub gain: f64,
}

impl Default for GridScanParams {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            end_x: 1000.0,
            step_x: 100.0,
            start_y: 0.0,
            end_y: 1000.0,
            step_y: 100.0,
            z_position: 0.0,
            exposure: 100.0,
            gain: 1.0,
        }
    }
}

/// Row-major raster: Y in the outer loop, X in the inner loop.
#[derive(Debug, Clone)]
pub struct GridScanPlan {
    job_id: JobId,
    params: GridScanParams,
    columns: u32,
    rows: u32,
}

impl GridScanPlan {
    /// Validate `params` and size the plan.
    pub fn new(job_id: JobId, params: GridScanParams) -> AppResult<Self> {
        let columns = inclusive_count("x", params.start_x, params.end_x, params.step_x)?;
        let rows = inclusive_count("y", params.start_y, params.end_y, params.step_y)?;
        require_finite("z_position", params.z_position)?;
        check_settings(params.exposure, params.gain)?;

        let total = u64::from(columns) * u64::from(rows);
        if total > u64::from(MAX_JOB_STEPS) {
            return Err(DaqError::Parameter(format!(
                "grid of {columns}x{rows} positions exceeds the limit of {MAX_JOB_STEPS} steps"
            )));
        }

        Ok(Self {
            job_id,
            params,
            columns,
            rows,
        })
    }

    /// Parse and validate a job's parameter map.
    pub fn from_parameters(job_id: JobId, params: &ParameterMap) -> AppResult<Self> {
        Self::new(job_id, parse(JobType::Grid, params)?)
    }

    /// Positions per row and number of rows.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }
}

impl StepGenerator for GridScanPlan {
    fn job_type(&self) -> JobType {
        JobType::Grid
    }

    fn total_steps(&self) -> u32 {
        self.columns * self.rows
    }

    fn step_at(&self, index: u32) -> Option<AcquisitionStep> {
        if index >= self.total_steps() {
            return None;
        }
        let p = &self.params;
        let x = axis_point(p.start_x, p.step_x, index % self.columns, p.end_x);
        let y = axis_point(p.start_y, p.step_y, index / self.columns, p.end_y);
        Some(AcquisitionStep {
            index,
            target: TargetPosition::xyz(x, y, p.z_position),
            settings: CaptureSettings {
                exposure_ms: p.exposure,
                gain: p.gain,
            },
            stem: format!("grid_{}_x{x}_y{y}", self.job_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::Steps;
    use serde_json::json;

    fn plan(params: serde_json::Value) -> AppResult<GridScanPlan> {
        GridScanPlan::from_parameters(9, params.as_object().unwrap())
    }

    #[test]
    fn test_row_major_order() {
        let plan = plan(json!({
            "start_x": 0, "end_x": 200, "step_x": 100,
            "start_y": 0, "end_y": 100, "step_y": 100,
            "z_position": 50
        }))
        .unwrap();
        assert_eq!(plan.dimensions(), (3, 2));

        let targets: Vec<(f64, f64)> = Steps::new(&plan)
            .map(|s| (s.target.x.unwrap(), s.target.y.unwrap()))
            .collect();
        assert_eq!(
            targets,
            vec![
                (0.0, 0.0),
                (100.0, 0.0),
                (200.0, 0.0),
                (0.0, 100.0),
                (100.0, 100.0),
                (200.0, 100.0),
            ]
        );
        assert!(Steps::new(&plan).all(|s| s.target.z == Some(50.0)));
    }

    #[test]
    fn test_stem_names_position() {
        let plan = plan(json!({"end_x": 100, "end_y": 0})).unwrap();
        assert_eq!(plan.step_at(1).unwrap().stem, "grid_9_x100_y0");
    }

    #[test]
    fn test_end_not_on_step_boundary() {
        let plan = plan(json!({"end_x": 250, "end_y": 0})).unwrap();
        assert_eq!(plan.total_steps(), 3);
        assert_eq!(plan.step_at(2).unwrap().target.x, Some(200.0));
    }

    #[test]
    fn test_fractional_steps_stop_at_end() {
        let plan = plan(json!({
            "end_x": 0.3, "step_x": 0.1,
            "end_y": 0.3, "step_y": 0.1
        }))
        .unwrap();
        assert_eq!(plan.dimensions(), (4, 4));
        let last = plan.step_at(15).unwrap().target;
        assert_eq!((last.x, last.y), (Some(0.3), Some(0.3)));
        assert!(Steps::new(&plan).all(|s| s.target.x <= Some(0.3) && s.target.y <= Some(0.3)));
    }

    #[test]
    fn test_default_grid_is_eleven_by_eleven() {
        assert_eq!(plan(json!({})).unwrap().total_steps(), 121);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(plan(json!({"step_x": 0})), Err(DaqError::Parameter(_))));
        assert!(matches!(
            plan(json!({"start_y": 500, "end_y": 100})),
            Err(DaqError::Parameter(_))
        ));
        assert!(matches!(
            plan(json!({"end_x": 1e6, "end_y": 1e6, "step_x": 1, "step_y": 1})),
            Err(DaqError::Parameter(_))
        ));
    }
}
