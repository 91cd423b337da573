//! Record store
//!
//! Two traits split the storage surface: [`HospitalStore`] for hospital rows
//! and [`OperationStore`] for bulk operation state. Every multi-row change the
//! ingestion pipeline depends on is a single named operation here, so each
//! implementation decides how to make it atomic.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    BulkOperation, BulkStatus, ErrorDetail, HospitalFilter, HospitalPatch, HospitalRecord,
    NewHospital, NewOperation, Progress,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bulk operation '{0}' does not exist")]
    UnknownBatch(String),

    #[error("Bulk operation '{0}' already exists")]
    DuplicateBatch(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait HospitalStore: Send + Sync {
    async fn insert(&self, hospital: NewHospital) -> StoreResult<HospitalRecord>;

    /// Insert several hospitals in one unit; either all are stored or none
    async fn bulk_insert(&self, hospitals: Vec<NewHospital>) -> StoreResult<Vec<HospitalRecord>>;

    async fn get(&self, id: i64) -> StoreResult<Option<HospitalRecord>>;

    /// Returns `None` when the hospital does not exist
    async fn update(&self, id: i64, patch: HospitalPatch) -> StoreResult<Option<HospitalRecord>>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// Matching hospitals ordered by id
    async fn query(&self, filter: &HospitalFilter) -> StoreResult<Vec<HospitalRecord>>;

    /// Ignores the filter's offset and limit
    async fn count(&self, filter: &HospitalFilter) -> StoreResult<i64>;

    async fn bulk_delete(&self, filter: &HospitalFilter) -> StoreResult<u64>;
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Create an operation in `in_progress` with zeroed counters
    async fn create_operation(&self, operation: NewOperation) -> StoreResult<BulkOperation>;

    async fn get_operation(&self, id: &str) -> StoreResult<Option<BulkOperation>>;

    /// Newest first
    async fn list_operations(
        &self,
        status: Option<BulkStatus>,
        limit: i64,
    ) -> StoreResult<Vec<BulkOperation>>;

    /// Persist counters and append row errors. Status is left alone.
    /// Returns `false` if the operation no longer exists.
    async fn checkpoint(
        &self,
        id: &str,
        progress: Progress,
        new_errors: &[ErrorDetail],
    ) -> StoreResult<bool>;

    /// Move to `to` only if the current status is one of `from`.
    ///
    /// When reopening to `in_progress`, `cursor` (if given) becomes the new
    /// `current_row` and `completed_at` is cleared. Returns whether the
    /// transition was applied.
    async fn transition(
        &self,
        id: &str,
        from: &[BulkStatus],
        to: BulkStatus,
        cursor: Option<i64>,
    ) -> StoreResult<bool>;

    /// In one transaction: if the operation is still `in_progress`, activate
    /// every hospital of the batch and mark it completed.
    ///
    /// Returns the number of activated hospitals, or `None` if the operation
    /// was no longer `in_progress` (nothing changed).
    async fn complete_and_activate(&self, id: &str) -> StoreResult<Option<u64>>;

    /// Mark an `in_progress` operation failed, optionally appending a
    /// batch-level error. Returns whether it was applied.
    async fn fail_operation(&self, id: &str, error: Option<ErrorDetail>) -> StoreResult<bool>;

    /// Delete the operation and all of its hospitals in one transaction.
    /// Returns the number of deleted hospitals, or `None` if it did not exist.
    async fn delete_operation_cascade(&self, id: &str) -> StoreResult<Option<u64>>;
}

/// Everything the service needs from storage
#[async_trait]
pub trait RecordStore: HospitalStore + OperationStore {
    async fn health_check(&self) -> StoreResult<()>;
}
