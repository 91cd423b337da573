//! Bulk operation tracker
//!
//! Operator-facing lifecycle actions on a batch: inspect, pause, prepare a
//! resume and delete. State checks and the resulting write are a single
//! conditional transition in the store, so two racing requests cannot both
//! win.

use std::sync::Arc;

use hdir_ingest::{interpret, prepare, InterpretError, InterpretOptions, StagedRow};
use serde::Serialize;
use thiserror::Error;

use super::progress::ProgressPublisher;
use crate::models::{BulkOperation, BulkStatus, ErrorDetail, Progress};
use crate::store::{OperationStore, RecordStore, StoreError};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Bulk operation not found")]
    NotFound(String),

    #[error("Cannot {action} operation with status: {status}")]
    InvalidState {
        id: String,
        action: &'static str,
        status: BulkStatus,
    },

    #[error("No file content available for resume")]
    NoContent(String),

    #[error("Invalid resume row: {row}")]
    InvalidResumeRow { row: i64, total: i64 },

    #[error("Bulk operation '{0}' is still being processed")]
    Busy(String),

    #[error("Stored upload can no longer be read: {0}")]
    Content(#[from] InterpretError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Error recorded against rows a resume jumps over
pub const SKIPPED_BY_RESUME: &str = "Skipped by resume";

/// A batch reopened for ingestion, ready to hand to the engine
#[derive(Debug)]
pub struct ResumePlan {
    pub operation: BulkOperation,
    /// The batch's non-skipped rows, re-read from the retained upload
    pub rows: Vec<StagedRow>,
    /// Rows already accounted for; ingestion restarts after this many
    pub cursor: i64,
}

impl ResumePlan {
    pub fn summary(&self) -> ResumeSummary {
        let resumed_from_row = self.cursor + 1;
        ResumeSummary {
            batch_id: self.operation.id.clone(),
            status: self.operation.status,
            resumed_from_row,
            remaining_rows: (self.operation.total_rows - self.cursor).max(0),
            message: format!(
                "Operation resumed from row {resumed_from_row}. Status: {}",
                self.operation.status
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeSummary {
    pub batch_id: String,
    pub status: BulkStatus,
    pub resumed_from_row: i64,
    pub remaining_rows: i64,
    pub message: String,
}

pub struct BulkOperationTracker {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn ProgressPublisher>,
    options: InterpretOptions,
}

impl BulkOperationTracker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn ProgressPublisher>,
        options: InterpretOptions,
    ) -> Self {
        Self {
            store,
            publisher,
            options,
        }
    }

    pub async fn get(&self, id: &str) -> TrackerResult<BulkOperation> {
        self.store
            .get_operation(id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }

    pub async fn list(
        &self,
        status: Option<BulkStatus>,
        limit: i64,
    ) -> TrackerResult<Vec<BulkOperation>> {
        Ok(self.store.list_operations(status, limit).await?)
    }

    /// Request a cooperative pause; the engine stops at its next row boundary
    #[tracing::instrument(skip(self))]
    pub async fn pause(&self, id: &str) -> TrackerResult<BulkOperation> {
        let applied = self
            .store
            .transition(id, &[BulkStatus::InProgress], BulkStatus::Paused, None)
            .await?;

        let operation = self.get(id).await?;
        if !applied {
            return Err(TrackerError::InvalidState {
                id: id.to_string(),
                action: "pause",
                status: operation.status,
            });
        }

        tracing::info!(current_row = operation.current_row, "Bulk operation paused");
        self.publisher.publish(&operation.snapshot());
        Ok(operation)
    }

    /// Reopen a paused or failed batch and rebuild its rows.
    ///
    /// `from_row` is 1-based over the batch's non-skipped rows. The restart
    /// point never moves backwards past the checkpoint, so no row is ingested
    /// twice. Rows a later `from_row` jumps over are recorded as failed, so
    /// the batch can no longer be activated.
    #[tracing::instrument(skip(self))]
    pub async fn prepare_resume(&self, id: &str, from_row: Option<i64>) -> TrackerResult<ResumePlan> {
        let operation = self.get(id).await?;

        if !operation.status.is_resumable() {
            return Err(TrackerError::InvalidState {
                id: id.to_string(),
                action: "resume",
                status: operation.status,
            });
        }

        let content = match operation.file_content.as_deref() {
            Some(content) if !content.is_empty() => content,
            _ => return Err(TrackerError::NoContent(id.to_string())),
        };

        let total = operation.total_rows;
        if let Some(row) = from_row {
            if row < 1 || row > total {
                return Err(TrackerError::InvalidResumeRow { row, total });
            }
        }

        let rows = prepare(&interpret(content, self.options)?).rows;
        if rows.len() as i64 != total {
            return Err(StoreError::Corrupt(format!(
                "retained upload for '{id}' has {} rows, operation expects {total}",
                rows.len()
            ))
            .into());
        }

        let requested = from_row.map_or(operation.current_row, |row| row - 1);
        let cursor = operation.current_row.max(requested).min(total);

        let reopened = self
            .store
            .transition(
                id,
                &[BulkStatus::Paused, BulkStatus::Failed],
                BulkStatus::InProgress,
                Some(cursor),
            )
            .await?;
        if !reopened {
            return Err(TrackerError::InvalidState {
                id: id.to_string(),
                action: "resume",
                status: self.get(id).await?.status,
            });
        }

        let checkpoint = operation.current_row.clamp(0, cursor) as usize;
        let skipped = &rows[checkpoint..cursor as usize];
        if !skipped.is_empty() {
            let details: Vec<ErrorDetail> = skipped
                .iter()
                .map(|staged| ErrorDetail {
                    row: staged.row_number as i64,
                    error: SKIPPED_BY_RESUME.to_string(),
                    data: staged.raw_data.clone(),
                })
                .collect();
            let progress = Progress {
                current_row: cursor,
                processed_rows: operation.processed_rows,
                failed_rows: operation.failed_rows + skipped.len() as i64,
            };
            self.store.checkpoint(id, progress, &details).await?;
            tracing::warn!(skipped = skipped.len(), "Rows skipped by resume recorded as failed");
        }

        let operation = self.get(id).await?;
        tracing::info!(cursor, total, "Bulk operation reopened");
        self.publisher.publish(&operation.snapshot());

        Ok(ResumePlan {
            operation,
            rows,
            cursor,
        })
    }

    /// Remove the operation and every hospital it created
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> TrackerResult<u64> {
        let removed = self
            .store
            .delete_operation_cascade(id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))?;
        tracing::info!(hospitals = removed, "Bulk operation deleted");
        Ok(removed)
    }
}
