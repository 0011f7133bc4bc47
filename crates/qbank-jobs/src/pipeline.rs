//! Upload -> parse worker: one queue, one worker task, status recorded through a JobTracker.

use crate::JobTracker;
use chrono::Utc;
use qbank_types::{
    DocumentParser, FileRef, Job, JobError, JobKind, JobResult, JobStatus, ParseInput,
    TrackerError, UploadFile,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// File handed over by the upload subsystem, with its extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file: UploadFile,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("pipeline worker is not running")]
    WorkerClosed,
}

/// Drives upload jobs to completion and chains a parse job onto each finished upload.
///
/// Parser failures end up on the parse job via `fail`; they are never returned to the submitter.
/// Clients find the parse job by listing parse jobs for the upload's `file_id`.
pub struct UploadParsePipeline {
    tracker: Arc<dyn JobTracker + Send + Sync>,
    tx: mpsc::UnboundedSender<(String, UploadRequest)>,
}

impl UploadParsePipeline {
    /// Create the pipeline and spawn its worker on the current tokio runtime.
    pub fn new(
        tracker: Arc<dyn JobTracker + Send + Sync>,
        parser: Arc<dyn DocumentParser + Send + Sync>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, UploadRequest)>();

        let worker_tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            while let Some((job_id, req)) = rx.recv().await {
                if let Err(e) =
                    run_upload(worker_tracker.as_ref(), parser.as_ref(), &job_id, req).await
                {
                    tracing::error!(job_id = %job_id, error = %e, "pipeline step failed");
                }
            }
            tracing::debug!("pipeline worker stopped");
        });

        Self { tracker, tx }
    }

    /// Register an upload job for `req.file` and queue it. Returns the pending job.
    pub async fn submit(&self, req: UploadRequest) -> Result<Job, PipelineError> {
        let job = self
            .tracker
            .create_for_file(JobKind::Upload, FileRef::from(&req.file))
            .await?;
        tracing::info!(job_id = %job.id(), file_id = %req.file.id, "upload submitted");
        if self.tx.send((job.id().to_string(), req)).is_err() {
            self.tracker
                .fail(
                    job.id(),
                    JobError::new("pipeline worker is not running").with_code("worker_closed"),
                )
                .await?;
            return Err(PipelineError::WorkerClosed);
        }
        Ok(job)
    }
}

/// Stable failure code for a tracker error hit while finishing a job.
fn tracker_error_code(e: &TrackerError) -> &'static str {
    match e {
        TrackerError::NotFound(_) => "unknown_category",
        TrackerError::Category(_) => "category_store_error",
        TrackerError::ResourceExhausted(_) => "resource_exhausted",
        TrackerError::InvalidState { .. } | TrackerError::InvalidTransition(_) => "tracker_error",
    }
}

/// Fail `job_id` with `e`, unless the job already ended.
async fn fail_with(
    tracker: &dyn JobTracker,
    job_id: &str,
    e: &TrackerError,
) -> Result<(), TrackerError> {
    let error = JobError::new(e.to_string()).with_code(tracker_error_code(e));
    match tracker.fail(job_id, error).await {
        Err(TrackerError::InvalidState { .. }) => Ok(()),
        other => other,
    }
}

async fn run_upload(
    tracker: &dyn JobTracker,
    parser: &dyn DocumentParser,
    upload_id: &str,
    req: UploadRequest,
) -> Result<(), TrackerError> {
    tracker
        .advance(upload_id, 50, Some("upload received".to_string()))
        .await?;

    let mut file = req.file;
    file.status = JobStatus::Completed;
    file.updated_at = Utc::now();

    // The parse job exists before the upload reports completion, so a client that sees a
    // completed upload always finds its parse job.
    let parse_job = match tracker
        .create_for_file(JobKind::Parse, FileRef::from(&file))
        .await
    {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(job_id = %upload_id, error = %e, "could not schedule parse job");
            return fail_with(tracker, upload_id, &e).await;
        }
    };
    let parse_id = parse_job.id();

    if let Err(e) = tracker
        .complete(upload_id, JobResult::Upload { file: file.clone() })
        .await
    {
        fail_with(tracker, parse_id, &e).await?;
        return Err(e);
    }

    tracker
        .advance(parse_id, 10, Some("parsing document".to_string()))
        .await?;

    let input = ParseInput {
        file: FileRef::from(&file),
        content: req.content,
        category_id: req.category_id,
    };
    let questions = match parser.parse(&input).await {
        Ok(q) => q,
        Err(e) => {
            tracing::warn!(job_id = %parse_id, error = %e, "document parse failed");
            return tracker
                .fail(parse_id, JobError::new(e.to_string()).with_code(e.code()))
                .await;
        }
    };

    tracker
        .advance(
            parse_id,
            90,
            Some(format!("extracted {} questions", questions.len())),
        )
        .await?;
    match tracker
        .complete(parse_id, JobResult::Parse { questions })
        .await
    {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(job_id = %parse_id, error = %e, "parse result rejected");
            fail_with(tracker, parse_id, &e).await
        }
    }
}
