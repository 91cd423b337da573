use crate::models::{HospitalFilter, HospitalRecord};
use crate::store::{HospitalStore, RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct HospitalsByBatchQuery {
    pub batch_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HospitalsByBatchError {
    #[error("No hospitals found for batch ID: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Every record of the batch, active or not
#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RecordStore,
    query: HospitalsByBatchQuery,
) -> Result<Vec<HospitalRecord>, HospitalsByBatchError> {
    let records = store.query(&HospitalFilter::batch(&query.batch_id)).await?;
    if records.is_empty() {
        return Err(HospitalsByBatchError::NotFound(query.batch_id));
    }
    Ok(records)
}
