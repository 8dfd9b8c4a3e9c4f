//! Job and image persistence.
//!
//! [`JobStore::apply`] is the single write path for status changes. It runs
//! [`Job::apply`] under the store's per-entry lock, so a pause or cancel from
//! a control actor and a lifecycle write from the engine can never
//! interleave into an illegal status.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use daq_core::{
    AppResult, CapturedImage, DaqError, ImageId, Job, JobId, JobStatus, JobUpdate, NewJob,
};
use dashmap::DashMap;
use tracing::debug;

/// Job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new pending job and assign its id.
    async fn create(&self, request: NewJob) -> AppResult<Job>;

    /// Fetch a job by id.
    async fn load(&self, id: JobId) -> AppResult<Job>;

    /// Overwrite a whole record, e.g. when restoring jobs from an export.
    /// Bypasses transition checks; the engine and scheduler only use
    /// [`JobStore::apply`].
    async fn save(&self, job: &Job) -> AppResult<()>;

    /// Apply one atomic update and return the resulting record.
    ///
    /// # Errors
    ///
    /// [`DaqError::JobNotFound`], or the error from [`Job::apply`] with the
    /// stored record left unchanged.
    async fn apply(&self, id: JobId, update: JobUpdate) -> AppResult<Job>;

    /// All jobs, optionally filtered by status, in id order.
    async fn list(&self, status: Option<JobStatus>) -> AppResult<Vec<Job>>;
}

/// Captured image records.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist an image record and return its id.
    async fn create(&self, image: CapturedImage) -> AppResult<ImageId>;
}

/// In-process job store.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
    next_id: AtomicU64,
}

impl InMemoryJobStore {
    /// Empty store; ids start at 1.
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Remove a job record.
    pub fn remove(&self, id: JobId) -> AppResult<Job> {
        self.jobs
            .remove(&id)
            .map(|(_, job)| job)
            .ok_or(DaqError::JobNotFound(id))
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, request: NewJob) -> AppResult<Job> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(id, request);
        self.jobs.insert(id, job.clone());
        debug!(job_id = id, job_type = %job.job_type, "job created");
        Ok(job)
    }

    async fn load(&self, id: JobId) -> AppResult<Job> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DaqError::JobNotFound(id))
    }

    async fn save(&self, job: &Job) -> AppResult<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn apply(&self, id: JobId, update: JobUpdate) -> AppResult<Job> {
        let mut entry = self.jobs.get_mut(&id).ok_or(DaqError::JobNotFound(id))?;
        entry.apply(&update)?;
        Ok(entry.value().clone())
    }

    async fn list(&self, status: Option<JobStatus>) -> AppResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| status.map_or(true, |s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }
}

/// In-process image store.
#[derive(Debug)]
pub struct InMemoryImageStore {
    images: DashMap<ImageId, CapturedImage>,
    next_id: AtomicU64,
}

impl InMemoryImageStore {
    /// Empty store; ids start at 1.
    pub fn new() -> Self {
        Self {
            images: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Fetch an image record.
    pub fn get(&self, id: ImageId) -> Option<CapturedImage> {
        self.images.get(&id).map(|entry| entry.value().clone())
    }

    /// Images of one job in capture order.
    pub fn for_job(&self, job_id: JobId) -> Vec<CapturedImage> {
        let mut images: Vec<(ImageId, CapturedImage)> = self
            .images
            .iter()
            .filter(|entry| entry.job_id == job_id)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        images.sort_by_key(|(id, _)| *id);
        images.into_iter().map(|(_, image)| image).collect()
    }

    /// Number of stored images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl Default for InMemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn create(&self, image: CapturedImage) -> AppResult<ImageId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.images.insert(id, image);
        Ok(id)
    }
}
