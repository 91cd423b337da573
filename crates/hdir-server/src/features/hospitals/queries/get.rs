use crate::models::HospitalRecord;
use crate::store::{HospitalStore, RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct GetHospitalQuery {
    pub id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum GetHospitalError {
    #[error("Hospital not found")]
    NotFound(i64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RecordStore,
    query: GetHospitalQuery,
) -> Result<HospitalRecord, GetHospitalError> {
    store
        .get(query.id)
        .await?
        .ok_or(GetHospitalError::NotFound(query.id))
}
