//! JobTracker trait: create jobs, record transitions, read snapshots.

use async_trait::async_trait;
use qbank_types::{
    ActivityItem, Category, FileRef, Job, JobError, JobKind, JobResult, JobStatus, PageRequest,
    PaginatedResponse, ProcessingLog, Statistics, TrackerError,
};

/// Listing filter. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub kind: Option<JobKind>,
    pub status: Option<JobStatus>,
    pub file_id: Option<String>,
    pub page: PageRequest,
}

impl JobQuery {
    pub fn matches(&self, job: &Job) -> bool {
        self.kind.map_or(true, |k| job.kind() == k)
            && self.status.map_or(true, |s| job.status() == s)
            && self.file_id.as_deref().map_or(true, |id| {
                job.file().map(|f| f.file_id.as_str()) == Some(id)
            })
    }
}

/// Tracker fill level, reported by health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub jobs: usize,
    pub active_jobs: usize,
    pub capacity: usize,
}

/// Tracks the lifecycle of upload and parse jobs.
///
/// Contract: mutations are serialized per job and either apply completely or not at all.
/// Terminal jobs (`completed`, `failed`) accept no further transitions.
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// New job in `pending` with progress 0. Fails only with `ResourceExhausted`.
    async fn create(&self, kind: JobKind) -> Result<Job, TrackerError>;

    /// Like [`JobTracker::create`], recording the file the job works on.
    async fn create_for_file(&self, kind: JobKind, file: FileRef) -> Result<Job, TrackerError>;

    /// Record progress; moves a pending job to `processing`.
    async fn advance(
        &self,
        job_id: &str,
        progress: u8,
        message: Option<String>,
    ) -> Result<(), TrackerError>;

    async fn complete(&self, job_id: &str, result: JobResult) -> Result<(), TrackerError>;

    async fn fail(&self, job_id: &str, error: JobError) -> Result<(), TrackerError>;

    /// Current snapshot.
    async fn get(&self, job_id: &str) -> Result<Job, TrackerError>;

    async fn list(&self, query: &JobQuery) -> Result<PaginatedResponse<Job>, TrackerError>;

    /// Transition log of one job, oldest first.
    async fn logs(&self, job_id: &str) -> Result<Vec<ProcessingLog>, TrackerError>;

    /// Drop terminal jobs that finished more than `older_than` ago. Returns how many were removed.
    async fn purge_terminal(&self, older_than: std::time::Duration) -> Result<usize, TrackerError>;

    async fn statistics(&self) -> Result<Statistics, TrackerError>;

    /// Most recently updated jobs as activity feed entries.
    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityItem>, TrackerError>;

    /// Questions in completed parse results filed under `category_id`.
    async fn category_question_count(&self, category_id: u64) -> Result<usize, TrackerError>;

    /// Delete a category that no completed parse result references.
    ///
    /// Errors come back as `TrackerError::Category`: `NotFound`, `Protected` for the default
    /// category, `InUse` while questions still reference it.
    async fn delete_category(&self, category_id: u64) -> Result<Category, TrackerError>;

    async fn occupancy(&self) -> Occupancy;
}
