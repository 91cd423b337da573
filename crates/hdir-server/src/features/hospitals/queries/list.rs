//! List hospitals query
//!
//! Ordered by id. Inactive records are included unless `active` filters them
//! out, so operators can see what a failed batch left behind.

use serde::{Deserialize, Serialize};

use crate::models::{HospitalFilter, HospitalRecord};
use crate::store::{HospitalStore, RecordStore, StoreError};

/// Largest page a single request may ask for
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListHospitalsQuery {
    pub batch_id: Option<String>,
    pub active: Option<bool>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListHospitalsResponse {
    pub items: Vec<HospitalRecord>,
    pub total: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ListHospitalsError {
    #[error("Offset must be non-negative")]
    InvalidOffset,

    #[error("Limit must be between 1 and 1000")]
    InvalidLimit,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ListHospitalsQuery {
    pub fn validate(&self) -> Result<HospitalFilter, ListHospitalsError> {
        if self.offset.is_some_and(|o| o < 0) {
            return Err(ListHospitalsError::InvalidOffset);
        }
        if self.limit.is_some_and(|l| !(1..=MAX_LIMIT).contains(&l)) {
            return Err(ListHospitalsError::InvalidLimit);
        }
        Ok(HospitalFilter {
            creation_batch_id: self.batch_id.clone(),
            active: self.active,
            offset: self.offset,
            limit: self.limit,
        })
    }
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RecordStore,
    query: ListHospitalsQuery,
) -> Result<ListHospitalsResponse, ListHospitalsError> {
    let filter = query.validate()?;
    let items = store.query(&filter).await?;
    let total = store.count(&filter).await?;
    Ok(ListHospitalsResponse { items, total })
}
