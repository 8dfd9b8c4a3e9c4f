//! Step generators: turn a job's parameters into an ordered, finite sequence
//! of [`AcquisitionStep`]s.
//!
//! Generators are index-addressed. `step_at(i)` is pure, so any suffix of a
//! sequence can be replayed after a pause without regenerating or caching
//! earlier steps. [`Steps`] walks a generator from a given index.
//!
//! New job types are added by registering a [`GeneratorFactory`] in a
//! [`GeneratorRegistry`]; the engine never matches on [`JobType`] itself.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use daq_core::{AppResult, DaqError, Job, JobId, JobType, ParameterMap};

use crate::step::AcquisitionStep;

mod grid;
pub(crate) mod params;
mod timelapse;
mod zstack;

pub use grid::{GridScanParams, GridScanPlan};
pub use timelapse::{TimelapseParams, TimelapsePlan};
pub use zstack::{ZStackParams, ZStackPlan};

/// A finite, restartable sequence of acquisition steps.
pub trait StepGenerator: Send + Sync + fmt::Debug {
    /// Job type this generator serves.
    fn job_type(&self) -> JobType;

    /// Exact number of steps. Always at least one.
    fn total_steps(&self) -> u32;

    /// Step at `index`, or `None` past the end.
    fn step_at(&self, index: u32) -> Option<AcquisitionStep>;

    /// Wall-clock spacing between consecutive steps, if the plan is timed.
    fn pacing(&self) -> Option<Duration> {
        None
    }
}

/// Iterator over a generator's steps.
pub struct Steps<'a> {
    generator: &'a dyn StepGenerator,
    next: u32,
}

impl<'a> Steps<'a> {
    /// Iterate from the first step.
    pub fn new(generator: &'a dyn StepGenerator) -> Self {
        Self::starting_at(generator, 0)
    }

    /// Iterate from `index`, e.g. to resume after step `index - 1`.
    pub fn starting_at(generator: &'a dyn StepGenerator, index: u32) -> Self {
        Self {
            generator,
            next: index,
        }
    }

    /// Index of the step the next call to `next` returns.
    pub fn position(&self) -> u32 {
        self.next
    }
}

impl Iterator for Steps<'_> {
    type Item = AcquisitionStep;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.generator.step_at(self.next)?;
        self.next += 1;
        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.generator.total_steps().saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Steps<'_> {}

/// Builds a generator for one job.
pub type GeneratorFactory = fn(JobId, &ParameterMap) -> AppResult<Box<dyn StepGenerator>>;

/// Job type to generator factory map.
#[derive(Clone)]
pub struct GeneratorRegistry {
    factories: HashMap<JobType, GeneratorFactory>,
}

impl GeneratorRegistry {
    /// Registry with no job types.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Timelapse, grid and z-stack.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(JobType::Timelapse, timelapse_factory);
        registry.register(JobType::Grid, grid_factory);
        registry.register(JobType::Zstack, zstack_factory);
        registry
    }

    /// Add or replace the factory for `job_type`, returning the previous one.
    pub fn register(
        &mut self,
        job_type: JobType,
        factory: GeneratorFactory,
    ) -> Option<GeneratorFactory> {
        self.factories.insert(job_type, factory)
    }

    /// Whether `job_type` has a generator.
    pub fn supports(&self, job_type: JobType) -> bool {
        self.factories.contains_key(&job_type)
    }

    /// Build the generator for `job`.
    ///
    /// # Errors
    ///
    /// [`DaqError::UnknownJobType`] when no factory is registered, or the
    /// factory's parameter error.
    pub fn create(&self, job: &Job) -> AppResult<Box<dyn StepGenerator>> {
        let factory = self
            .factories
            .get(&job.job_type)
            .ok_or_else(|| DaqError::UnknownJobType(job.job_type.to_string()))?;
        factory(job.id, &job.parameters)
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(JobType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("GeneratorRegistry")
            .field("job_types", &types)
            .finish()
    }
}

fn timelapse_factory(job_id: JobId, params: &ParameterMap) -> AppResult<Box<dyn StepGenerator>> {
    Ok(Box::new(TimelapsePlan::from_parameters(job_id, params)?))
}

fn grid_factory(job_id: JobId, params: &ParameterMap) -> AppResult<Box<dyn StepGenerator>> {
    Ok(Box::new(GridScanPlan::from_parameters(job_id, params)?))
}

fn zstack_factory(job_id: JobId, params: &ParameterMap) -> AppResult<Box<dyn StepGenerator>> {
    Ok(Box::new(ZStackPlan::from_parameters(job_id, params)?))
}
