//! Bulk API routes
//!
//! # Route Structure
//!
//! Uploads, mounted under `/hospitals`:
//!
//! - `POST /hospitals/bulk` - Ingest an upload within the request
//! - `POST /hospitals/bulk/background` - Start a background batch
//! - `POST /hospitals/bulk/validate` - Dry-run an upload
//! - `GET /hospitals/bulk/status/:batch_id` - Progress of a batch
//!
//! Operation lifecycle, mounted under `/bulk/operations`:
//!
//! - `GET /bulk/operations` - Recent operations, newest first
//! - `GET /bulk/operations/:id` - One operation
//! - `POST /bulk/operations/:id/pause` - Pause at the next row boundary
//! - `POST /bulk/operations/:id/resume` - Resume a paused or failed batch
//! - `DELETE /bulk/operations/:id` - Delete the operation and its hospitals

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use hdir_ingest::InterpretError;
use serde::Deserialize;
use serde_json::json;

use super::commands::{
    self, BackgroundUploadCommand, BackgroundUploadError, BulkUploadCommand, BulkUploadError,
    DeleteOperationCommand, PauseOperationCommand, ResumeOperationCommand, ResumeOperationError,
    ValidateUploadCommand,
};
use super::queries::{
    self, BulkStatusQuery, GetOperationQuery, ListOperationsError, ListOperationsQuery,
};
use crate::api::{internal_error, ApiResponse, ErrorResponse};
use crate::features::shared::{
    read_csv_upload, validate_row_delay, FieldValidationError, UploadError,
};
use crate::features::FeatureState;
use crate::ingest::{IngestError, SchedulerError, TrackerError};

// ============================================================================
// Router Configuration
// ============================================================================

pub fn upload_routes() -> Router<FeatureState> {
    Router::new()
        .route("/bulk", post(bulk_upload))
        .route("/bulk/background", post(background_upload))
        .route("/bulk/validate", post(validate_upload))
        .route("/bulk/status/:batch_id", get(bulk_status))
}

pub fn operations_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(list_operations))
        .route("/:id", get(get_operation).delete(delete_operation))
        .route("/:id/pause", post(pause_operation))
        .route("/:id/resume", post(resume_operation))
}

// ============================================================================
// Upload Handlers
// ============================================================================

/// Ingest an upload synchronously
///
/// # Endpoint
///
/// `POST /hospitals/bulk` (multipart, field `file`)
///
/// # Response
///
/// - `200 OK` - Per-row outcomes; `batch_activated` is true only when no row
///   failed
/// - `400 Bad Request` - Not a CSV, empty, undecodable, missing columns or
///   too many rows
/// - `500 Internal Server Error` - The pass aborted; the operation is marked
///   `failed` with a row-0 error
#[tracing::instrument(skip(state, multipart))]
async fn bulk_upload(
    State(state): State<FeatureState>,
    multipart: Multipart,
) -> Result<Response, BulkApiError> {
    let upload = read_csv_upload(multipart).await?;
    let command = BulkUploadCommand {
        upload,
        options: state.ingest.interpret_options(),
        checkpoint_interval: state.ingest.checkpoint_interval,
    };

    let response =
        commands::upload::handle(state.engine.clone(), &state.scheduler, command).await?;

    tracing::info!(
        batch_id = %response.batch_id,
        processed = response.processed_hospitals,
        failed = response.failed_hospitals,
        activated = response.batch_activated,
        "Bulk upload ingested via API"
    );

    Ok(ApiResponse::success(response).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct BackgroundParams {
    sleep_duration: Option<f64>,
}

/// Start a background batch
///
/// # Endpoint
///
/// `POST /hospitals/bulk/background?sleep_duration=0.5` (multipart, field
/// `file`)
///
/// # Response
///
/// - `202 Accepted` - Batch created with zero progress
/// - `400 Bad Request` - Invalid upload or sleep duration
#[tracing::instrument(skip(state, multipart))]
async fn background_upload(
    State(state): State<FeatureState>,
    Query(params): Query<BackgroundParams>,
    multipart: Multipart,
) -> Result<Response, BulkApiError> {
    let row_delay = validate_row_delay(
        params.sleep_duration,
        state.ingest.default_row_delay_secs,
        state.ingest.max_row_delay_secs,
    )?;
    let upload = read_csv_upload(multipart).await?;

    let command = BackgroundUploadCommand {
        upload,
        options: state.ingest.interpret_options(),
        row_delay,
        retain_content: state.ingest.retain_content,
    };
    let response =
        commands::background::handle(state.engine.clone(), &state.scheduler, command).await?;

    tracing::info!(
        batch_id = %response.batch_id,
        total_rows = response.total_rows,
        "Background bulk upload started via API"
    );

    Ok(ApiResponse::accepted(response).into_response())
}

/// Dry-run an upload
///
/// # Endpoint
///
/// `POST /hospitals/bulk/validate` (multipart, field `file`)
///
/// # Response
///
/// - `200 OK` - Validation report with batch id `validation_only`
/// - `400 Bad Request` - Invalid upload
#[tracing::instrument(skip(state, multipart))]
async fn validate_upload(
    State(state): State<FeatureState>,
    multipart: Multipart,
) -> Result<Response, BulkApiError> {
    let upload = read_csv_upload(multipart).await?;
    let report = commands::validate::handle(ValidateUploadCommand {
        upload,
        options: state.ingest.interpret_options(),
    })?;
    Ok(ApiResponse::success(report).into_response())
}

/// Progress of a batch
///
/// # Endpoint
///
/// `GET /hospitals/bulk/status/:batch_id`
///
/// # Response
///
/// - `200 OK` - Counters, percentage, stored record count and row errors
/// - `404 Not Found` - Unknown batch
#[tracing::instrument(skip(state))]
async fn bulk_status(
    State(state): State<FeatureState>,
    Path(batch_id): Path<String>,
) -> Result<Response, BulkApiError> {
    let response = queries::status::handle(
        &state.tracker,
        state.store.as_ref(),
        BulkStatusQuery { batch_id },
    )
    .await?;
    Ok(ApiResponse::success(response).into_response())
}

// ============================================================================
// Lifecycle Handlers
// ============================================================================

/// Recent operations
///
/// # Endpoint
///
/// `GET /bulk/operations?status=paused&limit=20`
///
/// # Response
///
/// - `200 OK` - Newest first, capped at the configured list limit
/// - `400 Bad Request` - Unknown status or non-positive limit
#[tracing::instrument(skip(state))]
async fn list_operations(
    State(state): State<FeatureState>,
    Query(query): Query<ListOperationsQuery>,
) -> Result<Response, BulkApiError> {
    let operations = queries::operations::list(&state.tracker, query, state.ingest.list_limit).await?;
    let meta = json!({ "count": operations.len() });
    Ok(ApiResponse::success_with_meta(operations, meta).into_response())
}

/// One operation
///
/// # Endpoint
///
/// `GET /bulk/operations/:id`
///
/// # Response
///
/// - `200 OK` - The operation, without its raw upload
/// - `404 Not Found` - Unknown operation
#[tracing::instrument(skip(state))]
async fn get_operation(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
) -> Result<Response, BulkApiError> {
    let operation = queries::operations::get(&state.tracker, GetOperationQuery { id }).await?;
    Ok(ApiResponse::success(operation).into_response())
}

/// Pause a running batch
///
/// # Endpoint
///
/// `POST /bulk/operations/:id/pause`
///
/// # Response
///
/// - `200 OK` - Paused; ingestion stops at the next row boundary
/// - `404 Not Found` - Unknown operation
/// - `409 Conflict` - Not `in_progress`
#[tracing::instrument(skip(state))]
async fn pause_operation(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
) -> Result<Response, BulkApiError> {
    let response = commands::lifecycle::pause(&state.tracker, PauseOperationCommand { id }).await?;
    Ok(ApiResponse::success(response).into_response())
}

/// Resume a paused or failed batch
///
/// # Endpoint
///
/// `POST /bulk/operations/:id/resume`
///
/// # Request Body (optional)
///
/// ```json
/// { "from_row": 3, "sleep_duration": 0 }
/// ```
///
/// # Response
///
/// - `200 OK` - Reopened and rescheduled
/// - `400 Bad Request` - Row out of range or invalid sleep duration
/// - `404 Not Found` - Unknown operation
/// - `409 Conflict` - Wrong status, no retained upload, or still running
#[tracing::instrument(skip(state, body))]
async fn resume_operation(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, BulkApiError> {
    let mut command = if body.iter().all(u8::is_ascii_whitespace) {
        ResumeOperationCommand::default()
    } else {
        serde_json::from_slice::<ResumeOperationCommand>(&body)
            .map_err(|e| BulkApiError::Body(e.to_string()))?
    };
    command.id = id;

    let summary = commands::lifecycle::resume(
        state.engine.clone(),
        &state.tracker,
        &state.scheduler,
        command,
        &state.ingest,
    )
    .await?;

    tracing::info!(
        batch_id = %summary.batch_id,
        resumed_from_row = summary.resumed_from_row,
        "Bulk operation resumed via API"
    );

    Ok(ApiResponse::success(summary).into_response())
}

/// Delete an operation and its hospitals
///
/// # Endpoint
///
/// `DELETE /bulk/operations/:id`
///
/// # Response
///
/// - `200 OK` - Deleted; a running pass stops at its next checkpoint
/// - `404 Not Found` - Unknown operation
#[tracing::instrument(skip(state))]
async fn delete_operation(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
) -> Result<Response, BulkApiError> {
    let response =
        commands::lifecycle::delete(&state.tracker, DeleteOperationCommand { id }).await?;
    Ok(ApiResponse::success(response).into_response())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum BulkApiError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Input(#[from] InterpretError),

    #[error(transparent)]
    Field(#[from] FieldValidationError),

    #[error("Invalid request body: {0}")]
    Body(String),

    #[error(transparent)]
    List(#[from] ListOperationsError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl From<BulkUploadError> for BulkApiError {
    fn from(err: BulkUploadError) -> Self {
        match err {
            BulkUploadError::Input(e) => Self::Input(e),
            BulkUploadError::Ingest(e) => Self::Ingest(e),
            BulkUploadError::Scheduler(e) => Self::Scheduler(e),
        }
    }
}

impl From<BackgroundUploadError> for BulkApiError {
    fn from(err: BackgroundUploadError) -> Self {
        match err {
            BackgroundUploadError::Input(e) => Self::Input(e),
            BackgroundUploadError::Ingest(e) => Self::Ingest(e),
            BackgroundUploadError::Scheduler(e) => Self::Scheduler(e),
        }
    }
}

impl From<ResumeOperationError> for BulkApiError {
    fn from(err: ResumeOperationError) -> Self {
        match err {
            ResumeOperationError::Validation(e) => Self::Field(e),
            ResumeOperationError::Tracker(e) => Self::Tracker(e),
        }
    }
}

/// 400 for an unreadable upload; missing columns carry both column lists
fn input_error(err: &InterpretError) -> Response {
    let body = match err {
        InterpretError::MissingColumns { missing, available } => ErrorResponse::with_details(
            err.code(),
            err.to_string(),
            json!({ "missing": missing, "available": available }),
        ),
        InterpretError::TooManyRows { max, found } => ErrorResponse::with_details(
            err.code(),
            err.to_string(),
            json!({ "max": max, "found": found }),
        ),
        _ => ErrorResponse::new(err.code(), err.to_string()),
    };
    body.into_response_with(StatusCode::BAD_REQUEST)
}

fn tracker_error(err: &TrackerError) -> Response {
    let message = err.to_string();
    match err {
        TrackerError::NotFound(_) => {
            ErrorResponse::new("NOT_FOUND", message).into_response_with(StatusCode::NOT_FOUND)
        },
        TrackerError::InvalidResumeRow { .. } => ErrorResponse::new("VALIDATION_ERROR", message)
            .into_response_with(StatusCode::BAD_REQUEST),
        TrackerError::InvalidState { status, .. } => ErrorResponse::with_details(
            "INVALID_STATE",
            message,
            json!({ "status": status }),
        )
        .into_response_with(StatusCode::CONFLICT),
        TrackerError::NoContent(_) => {
            ErrorResponse::new("NO_CONTENT", message).into_response_with(StatusCode::CONFLICT)
        },
        TrackerError::Busy(_) => {
            ErrorResponse::new("CONFLICT", message).into_response_with(StatusCode::CONFLICT)
        },
        TrackerError::Content(_) | TrackerError::Store(_) => internal_error(&message),
    }
}

impl IntoResponse for BulkApiError {
    fn into_response(self) -> Response {
        match &self {
            BulkApiError::Upload(UploadError::Multipart(_))
            | BulkApiError::Upload(UploadError::MissingFile)
            | BulkApiError::Upload(UploadError::NotCsv)
            | BulkApiError::Upload(UploadError::Empty)
            | BulkApiError::Field(_)
            | BulkApiError::Body(_)
            | BulkApiError::List(ListOperationsError::Status(_))
            | BulkApiError::List(ListOperationsError::InvalidLimit) => {
                ErrorResponse::new("VALIDATION_ERROR", self.to_string())
                    .into_response_with(StatusCode::BAD_REQUEST)
            },
            BulkApiError::Input(e) => input_error(e),
            BulkApiError::Tracker(e) | BulkApiError::List(ListOperationsError::Tracker(e)) => {
                tracker_error(e)
            },
            BulkApiError::Scheduler(SchedulerError::AlreadyRunning(_)) => {
                ErrorResponse::new("CONFLICT", self.to_string())
                    .into_response_with(StatusCode::CONFLICT)
            },
            BulkApiError::Scheduler(e @ SchedulerError::Aborted { .. }) => internal_error(e),
            BulkApiError::Ingest(e) => internal_error(e),
        }
    }
}
