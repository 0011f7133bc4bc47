//! Job record and its lifecycle: pending -> processing -> completed | failed.

use crate::{ExtractedQuestion, TrackerError, UploadFile};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of every terminal job. Active jobs stay below it.
pub const PROGRESS_DONE: u8 = 100;

/// Which stage of the upload -> parse chain a job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Upload,
    Parse,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Upload => "upload",
            JobKind::Parse => "parse",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload stored on a completed job, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobResult {
    Upload { file: UploadFile },
    Parse { questions: Vec<ExtractedQuestion> },
}

impl JobResult {
    pub fn kind(&self) -> JobKind {
        match self {
            JobResult::Upload { .. } => JobKind::Upload,
            JobResult::Parse { .. } => JobKind::Parse,
        }
    }

    /// Extracted questions; empty for upload results.
    pub fn questions(&self) -> &[ExtractedQuestion] {
        match self {
            JobResult::Parse { questions } => questions,
            JobResult::Upload { .. } => &[],
        }
    }
}

/// Failure detail stored on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Reference to the uploaded file a job is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    pub original_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl From<&UploadFile> for FileRef {
    fn from(f: &UploadFile) -> Self {
        Self {
            file_id: f.id.clone(),
            original_filename: f.original_name.clone(),
            file_size: Some(f.size),
            file_type: Some(f.file_type.clone()),
        }
    }
}

/// Lifecycle state. The terminal variants carry their payload, so a job can never hold
/// both a result and an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed(JobResult),
    Failed(JobError),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed(_) => JobStatus::Completed,
            JobState::Failed(_) => JobStatus::Failed,
        }
    }
}

/// One tracked unit of upload or parse work.
///
/// Fields are private: every change goes through [`Job::advance`], [`Job::complete`] or
/// [`Job::fail`], which validate before mutating anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "JobRecord", try_from = "JobRecord")]
pub struct Job {
    id: String,
    kind: JobKind,
    state: JobState,
    progress: u8,
    message: Option<String>,
    file: Option<FileRef>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// New job in `pending` with progress 0.
    pub fn new(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            state: JobState::Pending,
            progress: 0,
            message: None,
            file: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_file(kind: JobKind, file: FileRef) -> Self {
        let mut job = Self::new(kind);
        job.file = Some(file);
        job
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn file(&self) -> Option<&FileRef> {
        self.file.as_ref()
    }

    pub fn result(&self) -> Option<&JobResult> {
        match &self.state {
            JobState::Completed(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        match &self.state {
            JobState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// When the first `advance` moved the job to `processing`.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the job reached a terminal state.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn ensure_active(&self) -> Result<(), TrackerError> {
        if self.is_terminal() {
            return Err(TrackerError::InvalidState {
                id: self.id.clone(),
                status: self.status(),
            });
        }
        Ok(())
    }

    /// `updated_at` strictly increases on every transition, even within one clock tick.
    fn touch(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
        self.updated_at
    }

    /// Record progress. The first call moves a pending job to `processing`.
    ///
    /// Progress may stay equal but never go down, and 100 is reserved for terminal states.
    pub fn advance(&mut self, progress: u8, message: Option<String>) -> Result<(), TrackerError> {
        self.ensure_active()?;
        if progress >= PROGRESS_DONE {
            return Err(TrackerError::InvalidTransition(format!(
                "progress {} is reserved for terminal states; use complete or fail",
                progress
            )));
        }
        if progress < self.progress {
            return Err(TrackerError::InvalidTransition(format!(
                "progress cannot go from {} down to {}",
                self.progress, progress
            )));
        }
        let now = self.touch();
        if self.state == JobState::Pending {
            self.state = JobState::Processing;
            self.started_at = Some(now);
        }
        self.progress = progress;
        self.message = message;
        Ok(())
    }

    /// Whether [`Job::complete`] would accept `result`, without changing anything.
    pub fn check_complete(&self, result: &JobResult) -> Result<(), TrackerError> {
        self.ensure_active()?;
        if result.kind() != self.kind {
            return Err(TrackerError::InvalidTransition(format!(
                "{} job cannot complete with a {} result",
                self.kind,
                result.kind()
            )));
        }
        Ok(())
    }

    /// Move to `completed` with the given payload. The payload must match the job kind.
    pub fn complete(&mut self, result: JobResult) -> Result<(), TrackerError> {
        self.check_complete(&result)?;
        let now = self.touch();
        if let JobResult::Upload { file } = &result {
            if self.file.is_none() {
                self.file = Some(FileRef::from(file));
            }
        }
        self.state = JobState::Completed(result);
        self.progress = PROGRESS_DONE;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Move to `failed`. Allowed from any non-terminal state.
    pub fn fail(&mut self, error: JobError) -> Result<(), TrackerError> {
        self.ensure_active()?;
        let now = self.touch();
        self.state = JobState::Failed(error);
        self.progress = PROGRESS_DONE;
        self.finished_at = Some(now);
        Ok(())
    }
}

/// Flat wire shape of a [`Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobRecord {
    fn from(job: Job) -> Self {
        let status = job.status();
        let (result, error) = match job.state {
            JobState::Completed(r) => (Some(r), None),
            JobState::Failed(e) => (None, Some(e)),
            JobState::Pending | JobState::Processing => (None, None),
        };
        Self {
            id: job.id,
            kind: job.kind,
            status,
            progress: job.progress,
            message: job.message,
            result,
            error,
            file: job.file,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = TrackerError;

    fn try_from(r: JobRecord) -> Result<Self, Self::Error> {
        let state = match (r.status, r.result, r.error) {
            (JobStatus::Pending, None, None) => JobState::Pending,
            (JobStatus::Processing, None, None) => JobState::Processing,
            (JobStatus::Completed, Some(result), None) => JobState::Completed(result),
            (JobStatus::Failed, None, Some(error)) => JobState::Failed(error),
            (status, _, _) => {
                return Err(TrackerError::InvalidTransition(format!(
                    "job {} has result/error fields inconsistent with status {}",
                    r.id, status
                )))
            }
        };
        let terminal = state.status().is_terminal();
        if terminal != (r.progress == PROGRESS_DONE) || r.progress > PROGRESS_DONE {
            return Err(TrackerError::InvalidTransition(format!(
                "job {} has progress {} with status {}",
                r.id,
                r.progress,
                state.status()
            )));
        }
        if let JobState::Completed(result) = &state {
            if result.kind() != r.kind {
                return Err(TrackerError::InvalidTransition(format!(
                    "job {} is {} but carries a {} result",
                    r.id,
                    r.kind,
                    result.kind()
                )));
            }
        }
        Ok(Self {
            id: r.id,
            kind: r.kind,
            state,
            progress: r.progress,
            message: r.message,
            file: r.file,
            created_at: r.created_at,
            updated_at: r.updated_at,
            started_at: r.started_at,
            finished_at: r.finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_result() -> JobResult {
        JobResult::Parse {
            questions: vec![ExtractedQuestion::new(1, "What is 2 + 2?")],
        }
    }

    #[test]
    fn new_job_is_pending_at_zero() {
        let job = Job::new(JobKind::Upload);
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.progress(), 0);
        assert_eq!(job.created_at(), job.updated_at());
        assert!(job.result().is_none());
        assert!(job.error().is_none());
        assert!(!job.id().is_empty());
    }

    #[test]
    fn advance_then_complete() {
        let mut job = Job::new(JobKind::Parse);
        job.advance(50, Some("halfway".to_string())).unwrap();
        assert_eq!(job.status(), JobStatus::Processing);
        assert_eq!(job.message(), Some("halfway"));
        assert!(job.started_at().is_some());

        job.complete(parse_result()).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.progress(), 100);
        assert!(job.result().is_some());
        assert!(job.error().is_none());
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn progress_regression_is_rejected_without_side_effects() {
        let mut job = Job::new(JobKind::Parse);
        job.advance(60, Some("sixty".to_string())).unwrap();
        let before = job.clone();
        let err = job.advance(10, Some("ten".to_string())).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition(_)));
        assert_eq!(job, before);
    }

    #[test]
    fn equal_progress_is_allowed() {
        let mut job = Job::new(JobKind::Upload);
        job.advance(30, None).unwrap();
        job.advance(30, Some("still thirty".to_string())).unwrap();
        assert_eq!(job.progress(), 30);
    }

    #[test]
    fn advance_to_hundred_is_reserved() {
        let mut job = Job::new(JobKind::Upload);
        let err = job.advance(100, None).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition(_)));
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn fail_from_pending() {
        let mut job = Job::new(JobKind::Upload);
        job.fail(JobError::new("bad file")).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.progress(), 100);
        assert_eq!(job.error().map(|e| e.message.as_str()), Some("bad file"));
        assert!(job.result().is_none());
    }

    #[test]
    fn terminal_states_absorb() {
        let mut done = Job::new(JobKind::Parse);
        done.complete(parse_result()).unwrap();
        assert!(matches!(
            done.fail(JobError::new("late")),
            Err(TrackerError::InvalidState { .. })
        ));
        assert!(matches!(
            done.complete(parse_result()),
            Err(TrackerError::InvalidState { .. })
        ));
        assert!(matches!(
            done.advance(10, None),
            Err(TrackerError::InvalidState { .. })
        ));

        let mut failed = Job::new(JobKind::Parse);
        failed.fail(JobError::new("boom")).unwrap();
        assert!(matches!(
            failed.complete(parse_result()),
            Err(TrackerError::InvalidState { .. })
        ));
        assert!(matches!(
            failed.fail(JobError::new("again")),
            Err(TrackerError::InvalidState { .. })
        ));
    }

    #[test]
    fn result_kind_must_match_job_kind() {
        let mut job = Job::new(JobKind::Upload);
        let err = job.complete(parse_result()).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition(_)));
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn updated_at_moves_on_every_transition() {
        let mut job = Job::new(JobKind::Parse);
        let t0 = job.updated_at();
        job.advance(1, None).unwrap();
        let t1 = job.updated_at();
        job.advance(2, None).unwrap();
        let t2 = job.updated_at();
        job.complete(parse_result()).unwrap();
        assert!(t0 < t1 && t1 < t2 && t2 < job.updated_at());
        assert_eq!(job.created_at(), t0);
    }

    #[test]
    fn wire_shape_is_flat() {
        let mut job = Job::new(JobKind::Upload);
        job.fail(JobError::new("bad file").with_code("unsupported_type"))
            .unwrap();
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["kind"], "upload");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["error"]["message"], "bad file");
        assert!(json.get("result").is_none());

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn inconsistent_records_are_rejected() {
        let mut json = serde_json::to_value(Job::new(JobKind::Parse)).unwrap();
        json["status"] = "completed".into();
        assert!(serde_json::from_value::<Job>(json.clone()).is_err());

        json["status"] = "processing".into();
        json["progress"] = 100.into();
        assert!(serde_json::from_value::<Job>(json).is_err());
    }
}
