use serde::Serialize;

use crate::store::{HospitalStore, RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct DeleteHospitalCommand {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteHospitalResponse {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteHospitalError {
    #[error("Hospital not found")]
    NotFound(i64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RecordStore,
    command: DeleteHospitalCommand,
) -> Result<DeleteHospitalResponse, DeleteHospitalError> {
    if !store.delete(command.id).await? {
        return Err(DeleteHospitalError::NotFound(command.id));
    }

    Ok(DeleteHospitalResponse {
        id: command.id,
        message: "Hospital deleted successfully".to_string(),
    })
}
