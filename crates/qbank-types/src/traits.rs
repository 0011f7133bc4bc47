//! Collaborator traits and error types.

use crate::{
    Category, CategoryOrder, CategoryUpdate, ExtractedQuestion, FileRef, JobStatus, NewCategory,
};
use async_trait::async_trait;

/// Category storage. Owns referential integrity for `ExtractedQuestion::category_id`.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// All categories ordered by sort_order, then creation time.
    async fn list(&self) -> Result<Vec<Category>, CategoryError>;

    async fn get(&self, id: u64) -> Result<Option<Category>, CategoryError>;

    /// Default implementation uses get.
    async fn exists(&self, id: u64) -> Result<bool, CategoryError> {
        Ok(self.get(id).await?.is_some())
    }

    async fn create(&self, req: NewCategory) -> Result<Category, CategoryError>;

    /// Apply the fields set in `req`. `NotFound` for an unknown id.
    async fn update(&self, id: u64, req: CategoryUpdate) -> Result<Category, CategoryError>;

    /// Remove a category. The default category is `Protected`.
    ///
    /// Does not know about questions; callers that track questions check references first.
    async fn delete(&self, id: u64) -> Result<Category, CategoryError>;

    /// Set `sort_order` for each listed id. Unknown ids are skipped. Returns how many changed.
    async fn reorder(&self, orders: &[CategoryOrder]) -> Result<usize, CategoryError>;
}

/// Input handed to a [`DocumentParser`]: the uploaded file and its extracted text.
#[derive(Debug, Clone)]
pub struct ParseInput {
    pub file: FileRef,
    pub content: String,
    /// Category assigned to every question that does not name one.
    pub category_id: Option<u64>,
}

/// Turns document text into questions.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, input: &ParseInput) -> Result<Vec<ExtractedQuestion>, ParserError>;
}

/// Job tracker errors. A failed mutation leaves the job untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("job {id} is already {status}")]
    InvalidState { id: String, status: JobStatus },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Category store refused or failed an operation the tracker depends on.
    #[error(transparent)]
    Category(#[from] CategoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CategoryError {
    #[error("category not found: {0}")]
    NotFound(u64),
    #[error("category name is required")]
    EmptyName,
    #[error("no fields to update")]
    EmptyUpdate,
    #[error("category already exists: {0}")]
    Conflict(String),
    #[error("default category cannot be deleted: {0}")]
    Protected(String),
    #[error("category {id} still has {questions} questions")]
    InUse { id: u64, questions: usize },
    #[error("category store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("document is empty")]
    Empty,
    #[error("no questions found in {0}")]
    NoQuestions(String),
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("parser error: {0}")]
    Other(String),
}

impl ParserError {
    /// Stable code stored on the failed job.
    pub fn code(&self) -> &'static str {
        match self {
            ParserError::Empty => "empty_document",
            ParserError::NoQuestions(_) => "no_questions",
            ParserError::UnsupportedType(_) => "unsupported_type",
            ParserError::Other(_) => "parser_error",
        }
    }
}
