//! In-memory tracker: id -> job map, each job behind its own lock.

use crate::{JobQuery, JobTracker, Occupancy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qbank_types::{
    ActivityItem, ActivityStatus, ActivityType, Category, CategoryError, CategoryStore, FileRef,
    Job, JobError, JobKind, JobResult, JobStatus, LogDetails, PaginatedResponse, ProcessingLog,
    Statistics, TrackerError,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default maximum number of tracked jobs.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Window for `Statistics::recent_uploads`.
const RECENT_WINDOW_HOURS: i64 = 24;

struct JobEntry {
    job: Job,
    logs: Vec<ProcessingLog>,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let mut entry = Self {
            logs: Vec::new(),
            job,
        };
        let kind = entry.job.kind();
        entry.record(LogDetails::Created { kind });
        entry
    }

    fn record(&mut self, details: LogDetails) {
        let created_at = self.job.updated_at();
        let duration_ms = self.logs.last().map(|prev| {
            created_at
                .signed_duration_since(prev.created_at)
                .num_milliseconds()
                .max(0) as u64
        });
        self.logs.push(ProcessingLog {
            id: self.logs.len() as u64 + 1,
            job_id: self.job.id().to_string(),
            file_id: self.job.file().map(|f| f.file_id.clone()),
            step: details.step(),
            status: self.job.status(),
            message: self
                .job
                .error()
                .map(|e| e.message.clone())
                .or_else(|| self.job.message().map(str::to_string)),
            details,
            duration_ms,
            created_at,
        });
    }
}

type Entry = Arc<RwLock<JobEntry>>;

/// In-memory JobTracker. Concurrent `get` calls share read locks; writers to the same job queue
/// on that job's lock. The id index lock is only held for lookups, inserts and removals.
///
/// Lock order: `category_gate`, then a job, then the category store. Completions hold the gate
/// shared; category deletion holds it exclusively so no new reference can appear mid-delete.
pub struct InMemoryJobTracker {
    jobs: Arc<RwLock<HashMap<String, Entry>>>,
    capacity: usize,
    categories: Option<Arc<dyn CategoryStore + Send + Sync>>,
    category_gate: RwLock<()>,
}

impl InMemoryJobTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            categories: None,
            category_gate: RwLock::new(()),
        }
    }

    /// Check `category_id` of completed parse results against `store`.
    pub fn with_categories(mut self, store: Arc<dyn CategoryStore + Send + Sync>) -> Self {
        self.categories = Some(store);
        self
    }

    async fn entry(&self, job_id: &str) -> Result<Entry, TrackerError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("job {}", job_id)))
    }

    async fn insert(&self, job: Job) -> Result<Job, TrackerError> {
        let mut guard = self.jobs.write().await;
        if guard.len() >= self.capacity {
            tracing::warn!(capacity = self.capacity, "job capacity reached");
            return Err(TrackerError::ResourceExhausted(format!(
                "job capacity {} reached",
                self.capacity
            )));
        }
        guard.insert(
            job.id().to_string(),
            Arc::new(RwLock::new(JobEntry::new(job.clone()))),
        );
        drop(guard);
        tracing::info!(job_id = %job.id(), kind = %job.kind(), "job created");
        Ok(job)
    }

    async fn snapshot(&self) -> Vec<Job> {
        let entries: Vec<Entry> = self.jobs.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            out.push(e.read().await.job.clone());
        }
        out
    }

    /// Every category referenced by `result` must exist. Checked before the job is locked.
    async fn check_categories(&self, result: &JobResult) -> Result<(), TrackerError> {
        let Some(store) = &self.categories else {
            return Ok(());
        };
        let ids: BTreeSet<u64> = result
            .questions()
            .iter()
            .filter_map(|q| q.category_id)
            .collect();
        for id in ids {
            if !store.exists(id).await? {
                return Err(TrackerError::NotFound(format!("category {}", id)));
            }
        }
        Ok(())
    }

    /// Questions in completed parse results filed under `category_id`.
    async fn questions_in_category(&self, category_id: u64) -> usize {
        self.snapshot()
            .await
            .iter()
            .filter(|j| j.kind() == JobKind::Parse)
            .filter_map(|j| j.result())
            .flat_map(|r| r.questions())
            .filter(|q| q.category_id == Some(category_id))
            .count()
    }

    fn activity_for(job: &Job) -> ActivityItem {
        let name = job
            .file()
            .map(|f| f.original_filename.as_str())
            .unwrap_or_else(|| job.id());
        let (activity_type, title) = match job.kind() {
            JobKind::Upload => (ActivityType::Upload, format!("Uploaded {}", name)),
            JobKind::Parse => (ActivityType::Parse, format!("Parsed {}", name)),
        };
        let (status, description) = match job.status() {
            JobStatus::Completed => (
                ActivityStatus::Success,
                match job.kind() {
                    JobKind::Parse => Some(format!(
                        "{} questions extracted",
                        job.result().map_or(0, |r| r.questions().len())
                    )),
                    JobKind::Upload => job.message().map(str::to_string),
                },
            ),
            JobStatus::Failed => (
                ActivityStatus::Error,
                job.error().map(|e| e.message.clone()),
            ),
            JobStatus::Pending | JobStatus::Processing => (
                ActivityStatus::Info,
                Some(format!("{} ({}%)", job.status(), job.progress())),
            ),
        };
        ActivityItem {
            id: job.id().to_string(),
            activity_type,
            title,
            description,
            timestamp: job.updated_at(),
            status: Some(status),
        }
    }
}

impl Default for InMemoryJobTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobTracker for InMemoryJobTracker {
    async fn create(&self, kind: JobKind) -> Result<Job, TrackerError> {
        self.insert(Job::new(kind)).await
    }

    async fn create_for_file(&self, kind: JobKind, file: FileRef) -> Result<Job, TrackerError> {
        self.insert(Job::with_file(kind, file)).await
    }

    async fn advance(
        &self,
        job_id: &str,
        progress: u8,
        message: Option<String>,
    ) -> Result<(), TrackerError> {
        let entry = self.entry(job_id).await?;
        let mut guard = entry.write().await;
        let from = guard.job.progress();
        if let Err(e) = guard.job.advance(progress, message) {
            tracing::debug!(job_id = %job_id, error = %e, "advance rejected");
            return Err(e);
        }
        guard.record(LogDetails::Progress { from, to: progress });
        tracing::debug!(job_id = %job_id, progress, "job advanced");
        Ok(())
    }

    async fn complete(&self, job_id: &str, result: JobResult) -> Result<(), TrackerError> {
        let entry = self.entry(job_id).await?;
        let _gate = self.category_gate.read().await;
        let mut guard = entry.write().await;
        let checked = match guard.job.check_complete(&result) {
            Ok(()) => self.check_categories(&result).await,
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            tracing::debug!(job_id = %job_id, error = %e, "complete rejected");
            return Err(e);
        }
        let questions_count = result.questions().len();
        guard.job.complete(result)?;
        guard.record(LogDetails::Completed { questions_count });
        tracing::info!(
            job_id = %job_id,
            kind = %guard.job.kind(),
            questions_count,
            "job completed"
        );
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: JobError) -> Result<(), TrackerError> {
        let entry = self.entry(job_id).await?;
        let mut guard = entry.write().await;
        let code = error.code.clone();
        if let Err(e) = guard.job.fail(error) {
            tracing::debug!(job_id = %job_id, error = %e, "fail rejected");
            return Err(e);
        }
        guard.record(LogDetails::Failed { code });
        tracing::info!(
            job_id = %job_id,
            kind = %guard.job.kind(),
            error = guard.job.error().map(|e| e.message.as_str()).unwrap_or(""),
            "job failed"
        );
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Job, TrackerError> {
        let entry = self.entry(job_id).await?;
        let guard = entry.read().await;
        Ok(guard.job.clone())
    }

    async fn list(&self, query: &JobQuery) -> Result<PaginatedResponse<Job>, TrackerError> {
        let mut jobs: Vec<Job> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|j| query.matches(j))
            .collect();
        jobs.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(PaginatedResponse::from_items(jobs, query.page))
    }

    async fn logs(&self, job_id: &str) -> Result<Vec<ProcessingLog>, TrackerError> {
        let entry = self.entry(job_id).await?;
        let guard = entry.read().await;
        Ok(guard.logs.clone())
    }

    async fn purge_terminal(&self, older_than: std::time::Duration) -> Result<usize, TrackerError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| TrackerError::InvalidTransition(format!("retention: {}", e)))?;
        let cutoff: DateTime<Utc> = Utc::now() - age;
        let entries: Vec<(String, Entry)> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), Arc::clone(e)))
            .collect();
        let mut expired = Vec::new();
        for (id, entry) in entries {
            let finished_at = entry.read().await.job.finished_at();
            if finished_at.is_some_and(|t| t <= cutoff) {
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            // Terminal jobs never change, so the check above still holds.
            let mut guard = self.jobs.write().await;
            for id in &expired {
                guard.remove(id);
            }
            drop(guard);
            tracing::info!(removed = expired.len(), "purged terminal jobs");
        }
        Ok(expired.len())
    }

    async fn statistics(&self) -> Result<Statistics, TrackerError> {
        let since = Utc::now() - chrono::Duration::hours(RECENT_WINDOW_HOURS);
        let mut stats = Statistics::default();
        for job in self.snapshot().await {
            match (job.kind(), job.status()) {
                (JobKind::Upload, status) => {
                    if status == JobStatus::Completed {
                        stats.total_documents += 1;
                    }
                    if job.created_at() >= since {
                        stats.recent_uploads += 1;
                    }
                }
                (JobKind::Parse, JobStatus::Completed) => {
                    stats.total_questions +=
                        job.result().map_or(0, |r| r.questions().len() as u64);
                }
                (JobKind::Parse, _) => {}
            }
        }
        if let Some(store) = &self.categories {
            let categories = store.list().await?;
            stats.total_categories = categories.len() as u64;
        }
        Ok(stats)
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityItem>, TrackerError> {
        let mut jobs = self.snapshot().await;
        jobs.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(jobs.iter().take(limit).map(Self::activity_for).collect())
    }

    async fn category_question_count(&self, category_id: u64) -> Result<usize, TrackerError> {
        Ok(self.questions_in_category(category_id).await)
    }

    async fn delete_category(&self, category_id: u64) -> Result<Category, TrackerError> {
        let Some(store) = &self.categories else {
            return Err(CategoryError::Other("no category store configured".to_string()).into());
        };
        let _gate = self.category_gate.write().await;
        let category = store
            .get(category_id)
            .await?
            .ok_or(CategoryError::NotFound(category_id))?;
        if category.is_default {
            return Err(CategoryError::Protected(category.name).into());
        }
        let questions = self.questions_in_category(category_id).await;
        if questions > 0 {
            tracing::debug!(category_id, questions, "category delete refused");
            return Err(CategoryError::InUse {
                id: category_id,
                questions,
            }
            .into());
        }
        Ok(store.delete(category_id).await?)
    }

    async fn occupancy(&self) -> Occupancy {
        let jobs = self.snapshot().await;
        Occupancy {
            jobs: jobs.len(),
            active_jobs: jobs.iter().filter(|j| !j.is_terminal()).count(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCategoryStore;
    use qbank_types::{
        CategoryOrder, CategoryUpdate, ExtractedQuestion, NewCategory, PageRequest,
    };

    /// Category store whose backend is down.
    struct UnavailableStore;

    #[async_trait]
    impl CategoryStore for UnavailableStore {
        async fn list(&self) -> Result<Vec<Category>, CategoryError> {
            Err(CategoryError::Other("connection refused".to_string()))
        }
        async fn get(&self, _id: u64) -> Result<Option<Category>, CategoryError> {
            Err(CategoryError::Other("connection refused".to_string()))
        }
        async fn create(&self, _req: NewCategory) -> Result<Category, CategoryError> {
            Err(CategoryError::Other("connection refused".to_string()))
        }
        async fn update(&self, _id: u64, _req: CategoryUpdate) -> Result<Category, CategoryError> {
            Err(CategoryError::Other("connection refused".to_string()))
        }
        async fn delete(&self, _id: u64) -> Result<Category, CategoryError> {
            Err(CategoryError::Other("connection refused".to_string()))
        }
        async fn reorder(&self, _orders: &[CategoryOrder]) -> Result<usize, CategoryError> {
            Err(CategoryError::Other("connection refused".to_string()))
        }
    }

    fn parse_result(category_id: Option<u64>) -> JobResult {
        let mut q = ExtractedQuestion::new(1, "What is 2 + 2?");
        q.category_id = category_id;
        JobResult::Parse { questions: vec![q] }
    }

    #[tokio::test]
    async fn create_advance_complete() {
        let tracker = InMemoryJobTracker::new();
        let job = tracker.create(JobKind::Parse).await.unwrap();
        assert_eq!(job.status(), JobStatus::Pending);

        tracker.advance(job.id(), 50, None).await.unwrap();
        assert_eq!(tracker.get(job.id()).await.unwrap().progress(), 50);

        tracker.complete(job.id(), parse_result(None)).await.unwrap();
        let done = tracker.get(job.id()).await.unwrap();
        assert_eq!(done.status(), JobStatus::Completed);
        assert_eq!(done.progress(), 100);
        assert!(done.result().is_some());
        assert!(done.error().is_none());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let tracker = InMemoryJobTracker::new();
        assert!(matches!(
            tracker.advance("missing", 30, None).await,
            Err(TrackerError::NotFound(_))
        ));
        assert!(matches!(
            tracker.get("missing").await,
            Err(TrackerError::NotFound(_))
        ));
        assert!(matches!(
            tracker.fail("missing", JobError::new("x")).await,
            Err(TrackerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn regression_is_invalid_transition() {
        let tracker = InMemoryJobTracker::new();
        let job = tracker.create(JobKind::Upload).await.unwrap();
        tracker.advance(job.id(), 60, None).await.unwrap();
        assert!(matches!(
            tracker.advance(job.id(), 10, None).await,
            Err(TrackerError::InvalidTransition(_))
        ));
        assert_eq!(tracker.get(job.id()).await.unwrap().progress(), 60);
    }

    #[tokio::test]
    async fn fail_pending_job() {
        let tracker = InMemoryJobTracker::new();
        let job = tracker.create(JobKind::Upload).await.unwrap();
        tracker
            .fail(job.id(), JobError::new("bad file"))
            .await
            .unwrap();
        let failed = tracker.get(job.id()).await.unwrap();
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(failed.progress(), 100);
    }

    #[tokio::test]
    async fn second_terminal_transition_fails_either_order() {
        let tracker = InMemoryJobTracker::new();
        let a = tracker.create(JobKind::Parse).await.unwrap();
        tracker.complete(a.id(), parse_result(None)).await.unwrap();
        assert!(matches!(
            tracker.fail(a.id(), JobError::new("late")).await,
            Err(TrackerError::InvalidState { .. })
        ));

        let b = tracker.create(JobKind::Parse).await.unwrap();
        tracker.fail(b.id(), JobError::new("boom")).await.unwrap();
        assert!(matches!(
            tracker.complete(b.id(), parse_result(None)).await,
            Err(TrackerError::InvalidState { .. })
        ));
        assert_eq!(
            tracker.get(b.id()).await.unwrap().status(),
            JobStatus::Failed
        );
    }

    #[tokio::test]
    async fn capacity_limit_is_resource_exhausted() {
        let tracker = InMemoryJobTracker::with_capacity(2);
        tracker.create(JobKind::Upload).await.unwrap();
        tracker.create(JobKind::Upload).await.unwrap();
        assert!(matches!(
            tracker.create(JobKind::Upload).await,
            Err(TrackerError::ResourceExhausted(_))
        ));
    }

    #[tokio::test]
    async fn unknown_category_rejects_completion_without_applying() {
        let categories = Arc::new(InMemoryCategoryStore::with_defaults());
        let tracker = InMemoryJobTracker::new().with_categories(categories);
        let job = tracker.create(JobKind::Parse).await.unwrap();
        tracker.advance(job.id(), 40, None).await.unwrap();

        assert!(matches!(
            tracker.complete(job.id(), parse_result(Some(9999))).await,
            Err(TrackerError::NotFound(_))
        ));
        let still = tracker.get(job.id()).await.unwrap();
        assert_eq!(still.status(), JobStatus::Processing);
        assert_eq!(still.progress(), 40);

        tracker
            .complete(job.id(), parse_result(Some(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn logs_record_each_transition() {
        let tracker = InMemoryJobTracker::new();
        let job = tracker.create(JobKind::Parse).await.unwrap();
        tracker.advance(job.id(), 20, Some("reading".to_string())).await.unwrap();
        let _ = tracker.advance(job.id(), 5, None).await;
        tracker.fail(job.id(), JobError::new("boom").with_code("x")).await.unwrap();

        let logs = tracker.logs(job.id()).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].details, LogDetails::Created { kind: JobKind::Parse });
        assert_eq!(logs[1].details, LogDetails::Progress { from: 0, to: 20 });
        assert_eq!(logs[1].message.as_deref(), Some("reading"));
        assert_eq!(logs[2].status, JobStatus::Failed);
        assert_eq!(logs[2].message.as_deref(), Some("boom"));
        assert_eq!(logs.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let tracker = InMemoryJobTracker::new();
        for _ in 0..25 {
            tracker.create(JobKind::Upload).await.unwrap();
        }
        for _ in 0..3 {
            tracker.create(JobKind::Parse).await.unwrap();
        }
        let query = JobQuery {
            kind: Some(JobKind::Upload),
            page: PageRequest::new(2, 20),
            ..Default::default()
        };
        let page = tracker.list(&query).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 2);
        assert_eq!(page.items.len(), 5);
        assert!(page.items.iter().all(|j| j.kind() == JobKind::Upload));

        let parse = tracker
            .list(&JobQuery {
                kind: Some(JobKind::Parse),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(parse.total, 3);
    }

    #[tokio::test]
    async fn purge_removes_only_old_terminal_jobs() {
        let tracker = InMemoryJobTracker::new();
        let done = tracker.create(JobKind::Upload).await.unwrap();
        tracker.fail(done.id(), JobError::new("x")).await.unwrap();
        let active = tracker.create(JobKind::Upload).await.unwrap();

        assert_eq!(
            tracker
                .purge_terminal(std::time::Duration::from_secs(3600))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            tracker
                .purge_terminal(std::time::Duration::ZERO)
                .await
                .unwrap(),
            1
        );
        assert!(tracker.get(done.id()).await.is_err());
        assert!(tracker.get(active.id()).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_writers_never_regress_progress() {
        let tracker = Arc::new(InMemoryJobTracker::new());
        let job = tracker.create(JobKind::Parse).await.unwrap();
        let id = job.id().to_string();

        let mut handles = Vec::new();
        for p in 1..=99u8 {
            let t = Arc::clone(&tracker);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let _ = t.advance(&id, p, None).await;
            }));
        }
        let reader = {
            let t = Arc::clone(&tracker);
            let id = id.clone();
            tokio::spawn(async move {
                let mut last = 0u8;
                for _ in 0..200 {
                    let p = t.get(&id).await.unwrap().progress();
                    assert!(p >= last);
                    last = p;
                    tokio::task::yield_now().await;
                }
            })
        };
        for h in handles {
            h.await.unwrap();
        }
        reader.await.unwrap();

        let logs = tracker.logs(&id).await.unwrap();
        for w in logs.windows(2) {
            if let LogDetails::Progress { from, to } = w[1].details {
                assert!(to >= from);
            }
        }
        tracker.complete(&id, parse_result(None)).await.unwrap();
        assert_eq!(tracker.get(&id).await.unwrap().progress(), 100);
    }

    #[tokio::test]
    async fn statistics_and_activity() {
        let categories = Arc::new(InMemoryCategoryStore::with_defaults());
        let tracker = InMemoryJobTracker::new().with_categories(categories);
        let upload = tracker.create(JobKind::Upload).await.unwrap();
        tracker.fail(upload.id(), JobError::new("bad")).await.unwrap();
        let parse = tracker.create(JobKind::Parse).await.unwrap();
        tracker.complete(parse.id(), parse_result(None)).await.unwrap();

        let stats = tracker.statistics().await.unwrap();
        assert_eq!(stats.total_questions, 1);
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.recent_uploads, 1);
        assert_eq!(stats.total_categories, 10);

        let activity = tracker.recent_activity(1).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].id, parse.id());
        assert_eq!(activity[0].status, Some(ActivityStatus::Success));

        let occ = tracker.occupancy().await;
        assert_eq!(occ.jobs, 2);
        assert_eq!(occ.active_jobs, 0);
    }

    #[tokio::test]
    async fn second_complete_is_invalid_state_even_with_unknown_category() {
        let categories = Arc::new(InMemoryCategoryStore::with_defaults());
        let tracker = InMemoryJobTracker::new().with_categories(categories);
        let job = tracker.create(JobKind::Parse).await.unwrap();
        tracker.complete(job.id(), parse_result(Some(1))).await.unwrap();

        assert!(matches!(
            tracker.complete(job.id(), parse_result(Some(9999))).await,
            Err(TrackerError::InvalidState { .. })
        ));
        let failed = tracker.create(JobKind::Parse).await.unwrap();
        tracker.fail(failed.id(), JobError::new("boom")).await.unwrap();
        assert!(matches!(
            tracker.complete(failed.id(), parse_result(Some(9999))).await,
            Err(TrackerError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_result_kind_is_checked_before_categories() {
        let categories = Arc::new(InMemoryCategoryStore::with_defaults());
        let tracker = InMemoryJobTracker::new().with_categories(categories);
        let job = tracker.create(JobKind::Upload).await.unwrap();
        assert!(matches!(
            tracker.complete(job.id(), parse_result(Some(9999))).await,
            Err(TrackerError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn category_store_outage_is_not_not_found() {
        let tracker = InMemoryJobTracker::new().with_categories(Arc::new(UnavailableStore));
        let job = tracker.create(JobKind::Parse).await.unwrap();
        assert!(matches!(
            tracker.complete(job.id(), parse_result(Some(1))).await,
            Err(TrackerError::Category(CategoryError::Other(_)))
        ));
        assert_eq!(
            tracker.get(job.id()).await.unwrap().status(),
            JobStatus::Pending
        );
        assert!(matches!(
            tracker.statistics().await,
            Err(TrackerError::Category(CategoryError::Other(_)))
        ));
    }

    #[tokio::test]
    async fn referenced_category_cannot_be_deleted() {
        let categories = Arc::new(InMemoryCategoryStore::with_defaults());
        let tracker = InMemoryJobTracker::new().with_categories(categories.clone());
        let job = tracker.create(JobKind::Parse).await.unwrap();
        tracker.complete(job.id(), parse_result(Some(3))).await.unwrap();
        assert_eq!(tracker.category_question_count(3).await.unwrap(), 1);

        assert!(matches!(
            tracker.delete_category(3).await,
            Err(TrackerError::Category(CategoryError::InUse { id: 3, questions: 1 }))
        ));
        assert!(matches!(
            tracker.delete_category(10).await,
            Err(TrackerError::Category(CategoryError::Protected(_)))
        ));
        assert!(matches!(
            tracker.delete_category(404).await,
            Err(TrackerError::Category(CategoryError::NotFound(404)))
        ));
        assert_eq!(tracker.delete_category(5).await.unwrap().id, 5);
        assert!(!categories.exists(5).await.unwrap());

        // Once the referencing job is purged the category is free again.
        tracker
            .purge_terminal(std::time::Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(tracker.category_question_count(3).await.unwrap(), 0);
        tracker.delete_category(3).await.unwrap();
    }

    #[tokio::test]
    async fn purge_does_not_block_readers_of_active_jobs() {
        let tracker = Arc::new(InMemoryJobTracker::new());
        let active = tracker.create(JobKind::Parse).await.unwrap();
        let entry = tracker.entry(active.id()).await.unwrap();
        let held = entry.write().await;

        // A writer holds the active job; purge must still finish and leave the index usable.
        let purge = {
            let t = Arc::clone(&tracker);
            tokio::spawn(async move { t.purge_terminal(std::time::Duration::ZERO).await })
        };
        tokio::task::yield_now().await;
        let other = tracker.create(JobKind::Upload).await.unwrap();
        assert!(tracker.get(other.id()).await.is_ok());
        drop(held);
        assert_eq!(purge.await.unwrap().unwrap(), 0);
    }
}
