//! Operation lookups for the tracker endpoints

use serde::Deserialize;

use crate::ingest::{BulkOperationTracker, TrackerError};
use crate::models::{operation::UnknownStatus, BulkOperation, BulkStatus};

#[derive(Debug, Clone)]
pub struct GetOperationQuery {
    pub id: String,
}

#[tracing::instrument(skip(tracker))]
pub async fn get(
    tracker: &BulkOperationTracker,
    query: GetOperationQuery,
) -> Result<BulkOperation, TrackerError> {
    tracker.get(&query.id).await
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOperationsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListOperationsError {
    #[error(transparent)]
    Status(#[from] UnknownStatus),

    #[error("Limit must be greater than 0")]
    InvalidLimit,

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl ListOperationsQuery {
    /// Status filter and effective limit, capped at `max_limit`
    pub fn validate(&self, max_limit: i64) -> Result<(Option<BulkStatus>, i64), ListOperationsError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<BulkStatus>)
            .transpose()?;
        let limit = match self.limit {
            Some(l) if l < 1 => return Err(ListOperationsError::InvalidLimit),
            Some(l) => l.min(max_limit),
            None => max_limit,
        };
        Ok((status, limit))
    }
}

/// Newest first
#[tracing::instrument(skip(tracker))]
pub async fn list(
    tracker: &BulkOperationTracker,
    query: ListOperationsQuery,
    max_limit: i64,
) -> Result<Vec<BulkOperation>, ListOperationsError> {
    let (status, limit) = query.validate(max_limit)?;
    Ok(tracker.list(status, limit).await?)
}
