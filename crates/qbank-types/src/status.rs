//! Client-facing status views derived from job snapshots.

use crate::{ExtractedQuestion, Job, JobKind, JobStatus, QuestionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of questions included in a document preview.
pub const PREVIEW_LEN: usize = 3;

/// Upload phase shown by the client's upload widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    Uploading,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub status: UploadPhase,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl From<&Job> for UploadStatus {
    fn from(job: &Job) -> Self {
        let status = match job.status() {
            JobStatus::Pending => UploadPhase::Uploading,
            JobStatus::Processing => UploadPhase::Processing,
            JobStatus::Completed => UploadPhase::Completed,
            JobStatus::Failed => UploadPhase::Error,
        };
        let message = match job.error() {
            Some(e) => Some(e.message.clone()),
            None => job.message().map(str::to_string),
        };
        Self {
            status,
            progress: job.progress(),
            message,
            file_id: job.file().map(|f| f.file_id.clone()),
        }
    }
}

/// Progress of one file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub file_id: String,
    pub original_filename: String,
    /// Older clients read this instead of `original_filename`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub progress: u8,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadProgress {
    /// `None` for parse jobs and for upload jobs that do not know their file yet.
    pub fn from_job(job: &Job) -> Option<Self> {
        if job.kind() != JobKind::Upload {
            return None;
        }
        let file = job.file()?;
        Some(Self {
            file_id: file.file_id.clone(),
            original_filename: file.original_filename.clone(),
            file_name: Some(file.original_filename.clone()),
            progress: job.progress(),
            status: job.status(),
            message: job
                .error()
                .map(|e| e.message.clone())
                .or_else(|| job.message().map(str::to_string)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStatus {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_count: Option<usize>,
}

impl From<&Job> for ParseStatus {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status(),
            progress: job.progress(),
            message: job
                .error()
                .map(|e| e.message.clone())
                .or_else(|| job.message().map(str::to_string)),
            questions_count: job.result().map(|r| r.questions().len()),
        }
    }
}

/// A document as seen through its parse job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Id of the parse job.
    pub id: String,
    pub file_id: String,
    pub original_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<ExtractedQuestion>>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_types: Option<Vec<QuestionType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_preview: Option<Vec<ExtractedQuestion>>,
}

impl ParsedDocument {
    /// `None` unless `job` is a parse job with a file reference.
    pub fn from_job(job: &Job) -> Option<Self> {
        if job.kind() != JobKind::Parse {
            return None;
        }
        let file = job.file()?;
        let questions = job.result().map(|r| r.questions().to_vec());
        let question_types = questions.as_ref().map(|qs| {
            let mut types: Vec<QuestionType> = Vec::new();
            for t in qs.iter().filter_map(|q| q.question_type) {
                if !types.contains(&t) {
                    types.push(t);
                }
            }
            types
        });
        let questions_preview = questions
            .as_ref()
            .map(|qs| qs.iter().take(PREVIEW_LEN).cloned().collect());
        Some(Self {
            id: job.id().to_string(),
            file_id: file.file_id.clone(),
            original_filename: file.original_filename.clone(),
            file_name: Some(file.original_filename.clone()),
            file_size: file.file_size,
            file_type: file.file_type.clone(),
            extracted_count: questions.as_ref().map(Vec::len),
            questions,
            status: job.status(),
            error_message: job.error().map(|e| e.message.clone()),
            created_at: job.created_at(),
            updated_at: job.updated_at(),
            processing_started_at: job.started_at(),
            processed_at: job.finished_at(),
            question_types,
            questions_preview,
        })
    }
}
