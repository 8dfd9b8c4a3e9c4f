//! Parameter parsing and range helpers shared by the step generators.

use daq_core::limits::MAX_JOB_STEPS;
use daq_core::{AppResult, DaqError, JobType, ParameterMap};
use serde::de::DeserializeOwned;

/// Absorbs floating point error in `(end - start) / step`, e.g. 0.3 / 0.1.
const COUNT_EPSILON: f64 = 1e-9;

/// Deserialize a job's open parameter map into a typed parameter struct.
pub(crate) fn parse<P: DeserializeOwned>(job_type: JobType, params: &ParameterMap) -> AppResult<P> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| DaqError::Parameter(format!("invalid {job_type} parameters: {e}")))
}

pub(crate) fn require_finite(name: &str, value: f64) -> AppResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DaqError::Parameter(format!("{name} must be a finite number, got {value}")))
    }
}

pub(crate) fn require_positive(name: &str, value: f64) -> AppResult<()> {
    require_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(DaqError::Parameter(format!("{name} must be positive, got {value}")))
    }
}

/// `floor(x)` as a step count, bounded by [`MAX_JOB_STEPS`].
pub(crate) fn bounded_count(what: &str, x: f64) -> AppResult<u32> {
    let count = (x + COUNT_EPSILON).floor();
    if count > f64::from(MAX_JOB_STEPS) {
        return Err(DaqError::Parameter(format!(
            "{what} would generate {count} steps, more than the limit of {MAX_JOB_STEPS}"
        )));
    }
    Ok(count as u32)
}

/// Number of points on an inclusive axis range: `floor((end - start) / step) + 1`.
pub(crate) fn inclusive_count(axis: &str, start: f64, end: f64, step: f64) -> AppResult<u32> {
    require_finite(&format!("start_{axis}"), start)?;
    require_finite(&format!("end_{axis}"), end)?;
    require_positive(&format!("step_{axis}"), step)?;
    if end < start {
        return Err(DaqError::Parameter(format!(
            "end_{axis} ({end}) must not be less than start_{axis} ({start})"
        )));
    }
    let intervals = bounded_count(&format!("{axis} range"), (end - start) / step)?;
    Ok(intervals + 1)
}

/// Coordinate of point `index` on an inclusive axis range.
///
/// Capped at `end` so rounding in `start + index * step` never lands past
/// the last requested point.
pub(crate) fn axis_point(start: f64, step: f64, index: u32, end: f64) -> f64 {
    (start + f64::from(index) * step).min(end)
}

/// Exposure and gain shared by every generator.
pub(crate) fn check_settings(exposure: f64, gain: f64) -> AppResult<()> {
    require_positive("exposure", exposure)?;
    require_positive("gain", gain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_count() {
        assert_eq!(inclusive_count("x", 0.0, 200.0, 100.0).unwrap(), 3);
        assert_eq!(inclusive_count("x", 0.0, 250.0, 100.0).unwrap(), 3);
        assert_eq!(inclusive_count("x", 5.0, 5.0, 1.0).unwrap(), 1);
        assert_eq!(inclusive_count("z", 0.0, 0.3, 0.1).unwrap(), 4);
    }

    #[test]
    fn test_axis_point_never_passes_end() {
        assert_eq!(axis_point(0.0, 0.1, 3, 0.3), 0.3);
        assert_eq!(axis_point(0.0, 0.1, 2, 0.3), 0.2);
        assert_eq!(axis_point(0.0, 100.0, 2, 250.0), 200.0);
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let err = inclusive_count("y", 0.0, 10.0, 0.0).unwrap_err();
        assert_eq!(err.to_string(), "Parameter error: step_y must be positive, got 0");
        assert!(inclusive_count("y", 0.0, 10.0, -5.0).is_err());
        assert!(inclusive_count("y", 0.0, 10.0, f64::NAN).is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = inclusive_count("x", 100.0, 0.0, 10.0).unwrap_err();
        assert!(err.to_string().contains("end_x (0) must not be less than start_x (100)"));
    }

    #[test]
    fn test_step_count_is_bounded() {
        assert!(inclusive_count("x", 0.0, 1e12, 1.0).is_err());
    }
}
