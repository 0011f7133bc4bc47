//! Axum server and routes.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use qbank_jobs::{
    InMemoryCategoryStore, InMemoryJobTracker, JobQuery, JobTracker, PipelineError,
    UploadParsePipeline, UploadRequest,
};
use qbank_types::{
    ActivityItem, ApiResponse, Category, CategoryDetail, CategoryError, CategoryOrder,
    CategoryStore, CategoryUpdate, DocumentParser, FileRef, HealthDetails, HealthState,
    HealthStatus, Job, JobError, JobKind, JobResult, JobStatus, NewCategory, PageRequest,
    PaginatedResponse, ParseStatus, ParsedDocument, ProcessingLog, Statistics, TrackerError,
    UploadProgress, UploadStatus,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const DEFAULT_ACTIVITY_LIMIT: usize = 10;
const MAX_ACTIVITY_LIMIT: usize = 100;

pub struct AppState {
    pub tracker: Arc<dyn JobTracker + Send + Sync>,
    pub categories: Arc<dyn CategoryStore + Send + Sync>,
    pub pipeline: Arc<UploadParsePipeline>,
}

impl AppState {
    /// In-memory tracker and category store, with the pipeline worker spawned on the current
    /// runtime.
    pub fn in_memory(
        max_jobs: usize,
        parser: Arc<dyn DocumentParser + Send + Sync>,
    ) -> Arc<Self> {
        let categories: Arc<dyn CategoryStore + Send + Sync> =
            Arc::new(InMemoryCategoryStore::with_defaults());
        let tracker: Arc<dyn JobTracker + Send + Sync> = Arc::new(
            InMemoryJobTracker::with_capacity(max_jobs).with_categories(Arc::clone(&categories)),
        );
        let pipeline = Arc::new(UploadParsePipeline::new(Arc::clone(&tracker), parser));
        Arc::new(Self {
            tracker,
            categories,
            pipeline,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/jobs", post(handle_create_job).get(handle_list_jobs))
        .route("/api/jobs/:id", get(handle_get_job))
        .route("/api/jobs/:id/progress", post(handle_advance))
        .route("/api/jobs/:id/complete", post(handle_complete))
        .route("/api/jobs/:id/fail", post(handle_fail))
        .route("/api/jobs/:id/logs", get(handle_logs))
        .route("/api/uploads", post(handle_submit_upload))
        .route("/api/uploads/:id/progress", get(handle_upload_progress))
        .route("/api/uploads/:id/status", get(handle_upload_status))
        .route("/api/parse/:id/status", get(handle_parse_status))
        .route("/api/documents/:id", get(handle_document))
        .route(
            "/api/categories",
            get(handle_list_categories).post(handle_create_category),
        )
        .route("/api/categories/reorder", post(handle_reorder_categories))
        .route(
            "/api/categories/:id",
            put(handle_update_category)
                .get(handle_get_category)
                .delete(handle_delete_category),
        )
        .route("/api/statistics", get(handle_statistics))
        .route("/api/activity", get(handle_activity))
        .route("/api/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error response: status code plus a failed [`ApiResponse`] envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::failure(self.message))).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        let status = match &e {
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::InvalidState { .. } => StatusCode::CONFLICT,
            TrackerError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TrackerError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            TrackerError::Category(inner) => return inner.clone().into(),
        };
        Self::new(status, e.to_string())
    }
}

impl From<CategoryError> for ApiError {
    fn from(e: CategoryError) -> Self {
        let status = match &e {
            CategoryError::NotFound(_) => StatusCode::NOT_FOUND,
            CategoryError::EmptyName
            | CategoryError::EmptyUpdate
            | CategoryError::Protected(_)
            | CategoryError::InUse { .. } => StatusCode::BAD_REQUEST,
            CategoryError::Conflict(_) => StatusCode::CONFLICT,
            CategoryError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Tracker(t) => t.into(),
            other @ PipelineError::WorkerClosed => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::new(r.status(), r.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        Self::new(r.status(), r.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        Self::new(r.status(), r.body_text())
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub kind: JobKind,
    #[serde(default)]
    pub file: Option<FileRef>,
}

async fn handle_create_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Job>>), ApiError> {
    let Json(req) = payload?;
    let job = match req.file {
        Some(file) => state.tracker.create_for_file(req.kind, file).await?,
        None => state.tracker.create(req.kind).await?,
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(job))))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub file_id: Option<String>,
}

async fn handle_list_jobs(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> ApiResult<PaginatedResponse<Job>> {
    let Query(q) = query?;
    let defaults = PageRequest::default();
    let query = JobQuery {
        kind: q.kind,
        status: q.status,
        file_id: q.file_id,
        page: PageRequest::new(
            q.page.unwrap_or(defaults.page),
            q.per_page.unwrap_or(defaults.per_page),
        ),
    };
    ok(state.tracker.list(&query).await?)
}

async fn handle_get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Job> {
    ok(state.tracker.get(&id).await?)
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
}

async fn handle_advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AdvanceRequest>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(req) = payload?;
    state.tracker.advance(&id, req.progress, req.message).await?;
    ok(state.tracker.get(&id).await?)
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub result: JobResult,
}

async fn handle_complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(req) = payload?;
    state.tracker.complete(&id, req.result).await?;
    ok(state.tracker.get(&id).await?)
}

async fn handle_fail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<JobError>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(error) = payload?;
    state.tracker.fail(&id, error).await?;
    ok(state.tracker.get(&id).await?)
}

async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ProcessingLog>> {
    ok(state.tracker.logs(&id).await?)
}

async fn handle_submit_upload(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Job>>), ApiError> {
    let Json(req) = payload?;
    let job = state.pipeline.submit(req).await?;
    tracing::info!(job_id = %job.id(), "upload accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success_with_message(job, "Upload accepted")),
    ))
}

async fn handle_upload_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<UploadProgress> {
    let job = state.tracker.get(&id).await?;
    match UploadProgress::from_job(&job) {
        Some(p) => ok(p),
        None => Err(ApiError::not_found(format!(
            "job {} is not an upload job with a file",
            id
        ))),
    }
}

async fn handle_upload_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<UploadStatus> {
    let job = state.tracker.get(&id).await?;
    if job.kind() != JobKind::Upload {
        return Err(ApiError::not_found(format!("job {} is not an upload job", id)));
    }
    ok(UploadStatus::from(&job))
}

async fn handle_parse_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ParseStatus> {
    let job = state.tracker.get(&id).await?;
    if job.kind() != JobKind::Parse {
        return Err(ApiError::not_found(format!("job {} is not a parse job", id)));
    }
    ok(ParseStatus::from(&job))
}

async fn handle_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ParsedDocument> {
    let job = state.tracker.get(&id).await?;
    match ParsedDocument::from_job(&job) {
        Some(doc) => ok(doc),
        None => Err(ApiError::not_found(format!(
            "job {} is not a parse job with a file",
            id
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCategoriesQuery {
    #[serde(default)]
    pub include_count: bool,
}

async fn handle_list_categories(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListCategoriesQuery>, QueryRejection>,
) -> ApiResult<Vec<CategoryDetail>> {
    let Query(q) = query?;
    let mut out = Vec::new();
    for category in state.categories.list().await? {
        let question_count = if q.include_count {
            Some(state.tracker.category_question_count(category.id).await?)
        } else {
            None
        };
        out.push(CategoryDetail {
            category,
            question_count,
        });
    }
    ok(out)
}

async fn handle_get_category(
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<CategoryDetail> {
    let Path(id) = path?;
    let category = state
        .categories
        .get(id)
        .await?
        .ok_or(CategoryError::NotFound(id))?;
    let question_count = state.tracker.category_question_count(id).await?;
    ok(CategoryDetail {
        category,
        question_count: Some(question_count),
    })
}

async fn handle_update_category(
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<CategoryUpdate>, JsonRejection>,
) -> ApiResult<Category> {
    let Path(id) = path?;
    let Json(req) = payload?;
    let category = state.categories.update(id, req).await?;
    Ok(Json(ApiResponse::success_with_message(
        category,
        "Category updated",
    )))
}

/// Goes through the tracker, which refuses while parsed questions still reference the category.
async fn handle_delete_category(
    State(state): State<Arc<AppState>>,
    path: Result<Path<u64>, PathRejection>,
) -> ApiResult<Category> {
    let Path(id) = path?;
    let category = state.tracker.delete_category(id).await?;
    Ok(Json(ApiResponse::success_with_message(
        category,
        "Category deleted",
    )))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub category_orders: Vec<CategoryOrder>,
}

async fn handle_reorder_categories(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> ApiResult<Vec<Category>> {
    let Json(req) = payload?;
    let changed = state.categories.reorder(&req.category_orders).await?;
    tracing::debug!(changed, "category order updated");
    Ok(Json(ApiResponse::success_with_message(
        state.categories.list().await?,
        "Category order updated",
    )))
}

async fn handle_create_category(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewCategory>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), ApiError> {
    let Json(req) = payload?;
    let category = state.categories.create(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(category, "Category created")),
    ))
}

async fn handle_statistics(State(state): State<Arc<AppState>>) -> ApiResult<Statistics> {
    ok(state.tracker.statistics().await?)
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn handle_activity(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> ApiResult<Vec<ActivityItem>> {
    let Query(q) = query?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    ok(state.tracker.recent_activity(limit).await?)
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let occ = state.tracker.occupancy().await;
    let (status, message) = if occ.jobs >= occ.capacity {
        (HealthState::Error, "job capacity reached")
    } else if occ.jobs * 10 >= occ.capacity * 9 {
        (HealthState::Warning, "job capacity nearly reached")
    } else {
        (HealthState::Healthy, "service is running")
    };
    Json(HealthStatus {
        status,
        message: Some(message.to_string()),
        details: vec![
            HealthDetails::Tracker {
                jobs: occ.jobs,
                active_jobs: occ.active_jobs,
                capacity: occ.capacity,
            },
            HealthDetails::Version {
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        ],
    })
}
