//! Hospital API routes
//!
//! # Route Structure
//!
//! - `GET /hospitals` - List hospitals (optionally by batch and active flag)
//! - `POST /hospitals` - Create one hospital
//! - `GET /hospitals/:id` - Get a hospital
//! - `PUT /hospitals/:id` - Partially update a hospital
//! - `DELETE /hospitals/:id` - Delete a hospital
//! - `GET /hospitals/batch/:batch_id` - Hospitals created by a batch
//! - `DELETE /hospitals/batch/:batch_id` - Delete a batch's hospitals

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use super::{
    commands::{
        CreateHospitalCommand, CreateHospitalError, DeleteBatchHospitalsCommand,
        DeleteBatchHospitalsError, DeleteHospitalCommand, DeleteHospitalError,
        UpdateHospitalCommand, UpdateHospitalError,
    },
    queries::{
        GetHospitalError, GetHospitalQuery, HospitalsByBatchError, HospitalsByBatchQuery,
        ListHospitalsError, ListHospitalsQuery,
    },
};
use crate::api::{internal_error, ApiResponse, ErrorResponse};
use crate::features::FeatureState;

// ============================================================================
// Router Configuration
// ============================================================================

pub fn hospitals_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(list_hospitals).post(create_hospital))
        .route(
            "/:id",
            get(get_hospital).put(update_hospital).delete(delete_hospital),
        )
        .route(
            "/batch/:batch_id",
            get(hospitals_by_batch).delete(delete_batch_hospitals),
        )
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Create a hospital
///
/// # Endpoint
///
/// `POST /hospitals`
///
/// # Request Body
///
/// ```json
/// { "name": "General", "address": "1 Main St", "phone": "555-0100" }
/// ```
///
/// # Response
///
/// - `201 Created` - Hospital created and activated
/// - `400 Bad Request` - Missing name or address
/// - `500 Internal Server Error` - Store error
#[tracing::instrument(skip(state, command), fields(name = %command.name))]
async fn create_hospital(
    State(state): State<FeatureState>,
    Json(command): Json<CreateHospitalCommand>,
) -> Result<Response, HospitalApiError> {
    let record = super::commands::create::handle(
        state.engine.clone(),
        &state.scheduler,
        state.store.as_ref(),
        command,
    )
    .await?;

    tracing::info!(
        hospital_id = record.id,
        batch_id = %record.creation_batch_id,
        "Hospital created via API"
    );

    Ok(ApiResponse::created(record).into_response())
}

/// Update a hospital
///
/// # Endpoint
///
/// `PUT /hospitals/:id`
///
/// # Response
///
/// - `200 OK` - Updated record
/// - `400 Bad Request` - A supplied name or address is blank
/// - `404 Not Found` - Hospital not found
#[tracing::instrument(skip(state, command))]
async fn update_hospital(
    State(state): State<FeatureState>,
    Path(id): Path<i64>,
    Json(mut command): Json<UpdateHospitalCommand>,
) -> Result<Response, HospitalApiError> {
    command.id = id;
    let record = super::commands::update::handle(state.store.as_ref(), command).await?;
    Ok(ApiResponse::success(record).into_response())
}

/// Delete a hospital
///
/// # Endpoint
///
/// `DELETE /hospitals/:id`
///
/// # Response
///
/// - `200 OK` - Hospital deleted
/// - `404 Not Found` - Hospital not found
#[tracing::instrument(skip(state))]
async fn delete_hospital(
    State(state): State<FeatureState>,
    Path(id): Path<i64>,
) -> Result<Response, HospitalApiError> {
    let response =
        super::commands::delete::handle(state.store.as_ref(), DeleteHospitalCommand { id })
            .await?;
    tracing::info!(hospital_id = id, "Hospital deleted via API");
    Ok(ApiResponse::success(response).into_response())
}

/// Delete every hospital created by a batch
///
/// # Endpoint
///
/// `DELETE /hospitals/batch/:batch_id`
///
/// # Response
///
/// - `200 OK` - Records deleted; the bulk operation is kept
/// - `404 Not Found` - The batch has no records
#[tracing::instrument(skip(state))]
async fn delete_batch_hospitals(
    State(state): State<FeatureState>,
    Path(batch_id): Path<String>,
) -> Result<Response, HospitalApiError> {
    let response = super::commands::delete_batch::handle(
        state.store.as_ref(),
        DeleteBatchHospitalsCommand { batch_id },
    )
    .await?;
    Ok(ApiResponse::success(response).into_response())
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

/// List hospitals
///
/// # Endpoint
///
/// `GET /hospitals?batch_id=&active=&offset=&limit=`
///
/// # Response
///
/// - `200 OK` - Records with `meta.total`
/// - `400 Bad Request` - Invalid offset or limit
#[tracing::instrument(skip(state, query))]
async fn list_hospitals(
    State(state): State<FeatureState>,
    Query(query): Query<ListHospitalsQuery>,
) -> Result<Response, HospitalApiError> {
    let response = super::queries::list::handle(state.store.as_ref(), query).await?;

    tracing::debug!(count = response.items.len(), total = response.total, "Hospitals listed via API");

    let meta = json!({ "total": response.total });
    Ok(ApiResponse::success_with_meta(response.items, meta).into_response())
}

/// Get a hospital
///
/// # Endpoint
///
/// `GET /hospitals/:id`
///
/// # Response
///
/// - `200 OK` - Hospital found
/// - `404 Not Found` - Hospital not found
#[tracing::instrument(skip(state))]
async fn get_hospital(
    State(state): State<FeatureState>,
    Path(id): Path<i64>,
) -> Result<Response, HospitalApiError> {
    let record = super::queries::get::handle(state.store.as_ref(), GetHospitalQuery { id }).await?;
    Ok(ApiResponse::success(record).into_response())
}

/// Hospitals created by a batch
///
/// # Endpoint
///
/// `GET /hospitals/batch/:batch_id`
///
/// # Response
///
/// - `200 OK` - The batch's records, active or not
/// - `404 Not Found` - The batch has no records
#[tracing::instrument(skip(state))]
async fn hospitals_by_batch(
    State(state): State<FeatureState>,
    Path(batch_id): Path<String>,
) -> Result<Response, HospitalApiError> {
    let records = super::queries::by_batch::handle(
        state.store.as_ref(),
        HospitalsByBatchQuery { batch_id },
    )
    .await?;
    Ok(ApiResponse::success(records).into_response())
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum HospitalApiError {
    Create(CreateHospitalError),
    Update(UpdateHospitalError),
    Delete(DeleteHospitalError),
    DeleteBatch(DeleteBatchHospitalsError),
    Get(GetHospitalError),
    List(ListHospitalsError),
    ByBatch(HospitalsByBatchError),
}

macro_rules! impl_from {
    ($($variant:ident => $err:ty),* $(,)?) => {
        $(impl From<$err> for HospitalApiError {
            fn from(err: $err) -> Self {
                Self::$variant(err)
            }
        })*
    };
}

impl_from! {
    Create => CreateHospitalError,
    Update => UpdateHospitalError,
    Delete => DeleteHospitalError,
    DeleteBatch => DeleteBatchHospitalsError,
    Get => GetHospitalError,
    List => ListHospitalsError,
    ByBatch => HospitalsByBatchError,
}

fn validation_error(message: String) -> Response {
    ErrorResponse::new("VALIDATION_ERROR", message).into_response_with(StatusCode::BAD_REQUEST)
}

fn not_found(message: String) -> Response {
    ErrorResponse::new("NOT_FOUND", message).into_response_with(StatusCode::NOT_FOUND)
}

impl IntoResponse for HospitalApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            HospitalApiError::Create(CreateHospitalError::Validation(_))
            | HospitalApiError::Update(UpdateHospitalError::Validation(_))
            | HospitalApiError::List(ListHospitalsError::InvalidOffset)
            | HospitalApiError::List(ListHospitalsError::InvalidLimit) => validation_error(message),

            HospitalApiError::Update(UpdateHospitalError::NotFound(_))
            | HospitalApiError::Delete(DeleteHospitalError::NotFound(_))
            | HospitalApiError::DeleteBatch(DeleteBatchHospitalsError::NotFound(_))
            | HospitalApiError::Get(GetHospitalError::NotFound(_))
            | HospitalApiError::ByBatch(HospitalsByBatchError::NotFound(_)) => not_found(message),

            HospitalApiError::Create(CreateHospitalError::NotCreated(_))
            | HospitalApiError::Create(CreateHospitalError::Ingest(_))
            | HospitalApiError::Create(CreateHospitalError::Scheduler(_))
            | HospitalApiError::Create(CreateHospitalError::Store(_))
            | HospitalApiError::Update(UpdateHospitalError::Store(_))
            | HospitalApiError::Delete(DeleteHospitalError::Store(_))
            | HospitalApiError::DeleteBatch(DeleteBatchHospitalsError::Store(_))
            | HospitalApiError::Get(GetHospitalError::Store(_))
            | HospitalApiError::List(ListHospitalsError::Store(_))
            | HospitalApiError::ByBatch(HospitalsByBatchError::Store(_)) => {
                internal_error(&message)
            },
        }
    }
}

impl std::fmt::Display for HospitalApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create(e) => write!(f, "{}", e),
            Self::Update(e) => write!(f, "{}", e),
            Self::Delete(e) => write!(f, "{}", e),
            Self::DeleteBatch(e) => write!(f, "{}", e),
            Self::Get(e) => write!(f, "{}", e),
            Self::List(e) => write!(f, "{}", e),
            Self::ByBatch(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = HospitalApiError::Get(GetHospitalError::NotFound(9)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_errors_are_hidden() {
        let err = HospitalApiError::Delete(DeleteHospitalError::Store(
            crate::store::StoreError::Corrupt("secret".into()),
        ));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
