//! Delete a batch's hospitals
//!
//! Removes the records only. The bulk operation stays so its history remains
//! inspectable; deleting the operation itself cascades instead.

use serde::Serialize;

use crate::models::HospitalFilter;
use crate::store::{HospitalStore, RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct DeleteBatchHospitalsCommand {
    pub batch_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteBatchHospitalsResponse {
    pub batch_id: String,
    pub deleted: u64,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteBatchHospitalsError {
    #[error("No hospitals found for batch ID: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RecordStore,
    command: DeleteBatchHospitalsCommand,
) -> Result<DeleteBatchHospitalsResponse, DeleteBatchHospitalsError> {
    let deleted = store
        .bulk_delete(&HospitalFilter::batch(&command.batch_id))
        .await?;
    if deleted == 0 {
        return Err(DeleteBatchHospitalsError::NotFound(command.batch_id));
    }

    tracing::info!(deleted, "Batch hospitals deleted");
    Ok(DeleteBatchHospitalsResponse {
        batch_id: command.batch_id,
        deleted,
        message: "Deleted Successfully".to_string(),
    })
}
