//! Progress status of one batch

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::{BulkOperationTracker, TrackerError};
use crate::models::{operation::percentage, BulkStatus, ErrorDetail, HospitalFilter};
use crate::store::{HospitalStore, RecordStore};

#[derive(Debug, Clone)]
pub struct BulkStatusQuery {
    pub batch_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkStatusResponse {
    pub batch_id: String,
    pub status: BulkStatus,
    pub total_rows: i64,
    pub current_row: i64,
    pub processed_rows: i64,
    pub failed_rows: i64,
    pub progress_percentage: f64,
    /// Records stored for the batch so far, active or not
    pub hospital_count: i64,
    pub errors: Vec<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[tracing::instrument(skip(tracker, store))]
pub async fn handle(
    tracker: &BulkOperationTracker,
    store: &dyn RecordStore,
    query: BulkStatusQuery,
) -> Result<BulkStatusResponse, TrackerError> {
    let operation = tracker.get(&query.batch_id).await?;
    let hospital_count = store.count(&HospitalFilter::batch(&operation.id)).await?;

    Ok(BulkStatusResponse {
        progress_percentage: percentage(operation.current_row, operation.total_rows),
        batch_id: operation.id,
        status: operation.status,
        total_rows: operation.total_rows,
        current_row: operation.current_row,
        processed_rows: operation.processed_rows,
        failed_rows: operation.failed_rows,
        hospital_count,
        errors: operation.error_details,
        created_at: operation.created_at,
        updated_at: operation.updated_at,
        completed_at: operation.completed_at,
    })
}
