//! Batch ingestion engine
//!
//! Rows are processed strictly in order, in chunks of `checkpoint_interval`
//! rows. A chunk of several rows is stored with one bulk insert. Counters and
//! row errors are written to the operation after every chunk, and the operation's
//! status is re-read at the same boundaries: anything other than
//! `in_progress` (a pause) stops the pass, and a vanished operation (a delete)
//! cancels it.
//!
//! A pass always resumes from the operation's `current_row`, so a fresh batch
//! and a resumed one go through the same loop.

use std::sync::Arc;
use std::time::Duration;

use hdir_ingest::{PreparedBatch, StagedRow, StagedStatus};
use thiserror::Error;
use uuid::Uuid;

use super::progress::ProgressPublisher;
use super::types::{BatchResult, RowOutcome};
use crate::models::{
    BulkOperation, BulkStatus, ErrorDetail, NewHospital, NewOperation, Progress, ProgressSnapshot,
};
use crate::store::{HospitalStore, OperationStore, RecordStore, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bulk operation '{0}' not found")]
    NotFound(String),

    #[error("Bulk operation '{0}' was deleted during ingestion")]
    Cancelled(String),
}

/// Per-pass knobs
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Rows between checkpoints (and status checks); 1 means every row and
    /// one insert per row
    pub checkpoint_interval: usize,
    /// Pause after each row, for progress demonstrations
    pub row_delay: Duration,
}

impl RunOptions {
    pub fn every_row(row_delay: Duration) -> Self {
        Self {
            checkpoint_interval: 1,
            row_delay,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::every_row(Duration::ZERO)
    }
}

pub struct IngestionEngine {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn ProgressPublisher>,
    activation_retries: u32,
}

impl IngestionEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn ProgressPublisher>,
        activation_retries: u32,
    ) -> Self {
        Self {
            store,
            publisher,
            activation_retries,
        }
    }

    /// Create the operation for a prepared upload under a fresh batch id
    #[tracing::instrument(skip_all, fields(total_rows = batch.total_rows()))]
    pub async fn open_batch(
        &self,
        batch: &PreparedBatch,
        content: Option<Vec<u8>>,
    ) -> Result<BulkOperation, IngestError> {
        let operation = self
            .store
            .create_operation(NewOperation {
                id: Uuid::new_v4().to_string(),
                total_rows: batch.total_rows() as i64,
                file_content: content,
            })
            .await?;

        tracing::info!(
            batch_id = %operation.id,
            total_rows = operation.total_rows,
            skipped = batch.skipped,
            "Bulk operation created"
        );
        self.publisher.publish(&operation.snapshot());

        Ok(operation)
    }

    /// Process `rows` from the operation's checkpoint to the end, then
    /// finalize the batch.
    ///
    /// `rows` must be the batch's full list of non-skipped rows.
    #[tracing::instrument(skip(self, rows, options), fields(rows = rows.len()))]
    pub async fn run(
        &self,
        batch_id: &str,
        rows: &[StagedRow],
        options: RunOptions,
    ) -> Result<BatchResult, IngestError> {
        let operation = self
            .store
            .get_operation(batch_id)
            .await?
            .ok_or_else(|| IngestError::NotFound(batch_id.to_string()))?;

        let total = operation.total_rows;
        let interval = options.checkpoint_interval.max(1);
        let start = operation.current_row.clamp(0, rows.len() as i64) as usize;
        let mut progress = operation.progress();
        progress.current_row = start as i64;

        tracing::info!(start, total, interval, "Ingestion pass started");

        let mut outcomes = Vec::new();
        let mut pending_errors: Vec<ErrorDetail> = Vec::new();

        for chunk in rows[start..].chunks(interval) {
            if let Some(status) = self.interrupted(batch_id).await? {
                tracing::info!(%status, current_row = progress.current_row, "Ingestion pass stopped");
                return Ok(self.result(batch_id, status, total, progress, outcomes));
            }

            let chunk_outcomes = match chunk {
                [staged] => vec![self.ingest_row(batch_id, staged).await],
                _ => self.ingest_chunk(batch_id, chunk).await,
            };
            for outcome in chunk_outcomes {
                match &outcome {
                    RowOutcome::Created { .. } => progress.processed_rows += 1,
                    RowOutcome::Failed { row, error, data } => {
                        progress.failed_rows += 1;
                        pending_errors.push(ErrorDetail {
                            row: *row as i64,
                            error: error.clone(),
                            data: data.clone(),
                        });
                    },
                }
                outcomes.push(outcome);
                progress.current_row += 1;
            }

            self.checkpoint(batch_id, total, progress, &mut pending_errors)
                .await?;

            if !options.row_delay.is_zero() {
                tokio::time::sleep(options.row_delay * chunk.len() as u32).await;
            }
        }

        let status = self.finalize(batch_id, progress).await?;
        Ok(self.result(batch_id, status, total, progress, outcomes))
    }

    fn rejected(staged: &StagedRow, reason: &str) -> RowOutcome {
        tracing::warn!(row = staged.row_number, reason = %reason, "Row rejected");
        RowOutcome::Failed {
            row: staged.row_number,
            error: reason.to_string(),
            data: staged.raw_data.clone(),
        }
    }

    /// Store a chunk's accepted rows with one `bulk_insert`. If the store
    /// rejects the statement, the chunk is retried row by row so each error
    /// lands on its own row.
    async fn ingest_chunk(&self, batch_id: &str, chunk: &[StagedRow]) -> Vec<RowOutcome> {
        let accepted: Vec<NewHospital> = chunk
            .iter()
            .filter_map(|staged| match &staged.status {
                StagedStatus::Accepted(fields) => {
                    Some(NewHospital::from_fields(fields.clone(), batch_id))
                },
                StagedStatus::Rejected { .. } => None,
            })
            .collect();

        if !accepted.is_empty() {
            match self.store.bulk_insert(accepted).await {
                Ok(records) => {
                    let mut records = records.into_iter();
                    return chunk
                        .iter()
                        .map(|staged| match &staged.status {
                            StagedStatus::Rejected { reason } => Self::rejected(staged, reason),
                            StagedStatus::Accepted(_) => match records.next() {
                                Some(record) => RowOutcome::Created {
                                    row: staged.row_number,
                                    hospital_id: record.id,
                                    name: record.name,
                                },
                                None => Self::rejected(staged, "Hospital was not stored"),
                            },
                        })
                        .collect();
                },
                Err(e) => {
                    tracing::warn!(rows = chunk.len(), error = %e, "Bulk insert failed; retrying row by row");
                },
            }
        }

        let mut outcomes = Vec::with_capacity(chunk.len());
        for staged in chunk {
            outcomes.push(self.ingest_row(batch_id, staged).await);
        }
        outcomes
    }

    async fn ingest_row(&self, batch_id: &str, staged: &StagedRow) -> RowOutcome {
        let fields = match &staged.status {
            StagedStatus::Accepted(fields) => fields.clone(),
            StagedStatus::Rejected { reason } => return Self::rejected(staged, reason),
        };

        match self
            .store
            .insert(NewHospital::from_fields(fields, batch_id))
            .await
        {
            Ok(record) => {
                tracing::debug!(row = staged.row_number, hospital_id = record.id, "Hospital created");
                RowOutcome::Created {
                    row: staged.row_number,
                    hospital_id: record.id,
                    name: record.name,
                }
            },
            Err(e) => {
                tracing::warn!(row = staged.row_number, error = %e, "Failed to store hospital");
                RowOutcome::Failed {
                    row: staged.row_number,
                    error: e.to_string(),
                    data: staged.raw_data.clone(),
                }
            },
        }
    }

    /// `Some(status)` if the pass must stop before the next row
    async fn interrupted(&self, batch_id: &str) -> Result<Option<BulkStatus>, IngestError> {
        match self.store.get_operation(batch_id).await? {
            None => Err(IngestError::Cancelled(batch_id.to_string())),
            Some(op) if op.status != BulkStatus::InProgress => Ok(Some(op.status)),
            Some(_) => Ok(None),
        }
    }

    async fn checkpoint(
        &self,
        batch_id: &str,
        total: i64,
        progress: Progress,
        pending_errors: &mut Vec<ErrorDetail>,
    ) -> Result<(), IngestError> {
        if !self.store.checkpoint(batch_id, progress, pending_errors).await? {
            return Err(IngestError::Cancelled(batch_id.to_string()));
        }
        pending_errors.clear();

        tracing::debug!(
            current_row = progress.current_row,
            processed = progress.processed_rows,
            failed = progress.failed_rows,
            "Checkpoint written"
        );

        // Status may have changed since the last check; the store has it.
        let status = self
            .store
            .get_operation(batch_id)
            .await?
            .map_or(BulkStatus::InProgress, |op| op.status);
        self.publisher
            .publish(&ProgressSnapshot::new(batch_id, status, total, progress));
        Ok(())
    }

    /// Activate a clean batch, fail anything else
    async fn finalize(&self, batch_id: &str, progress: Progress) -> Result<BulkStatus, IngestError> {
        if progress.failed_rows == 0 && progress.processed_rows > 0 {
            let mut last_error = None;
            for attempt in 0..=self.activation_retries {
                match self.store.complete_and_activate(batch_id).await {
                    Ok(Some(activated)) => {
                        tracing::info!(activated, "Batch completed and activated");
                        return self.publish_final(batch_id).await;
                    },
                    Ok(None) => {
                        // Paused (or deleted) after the last row
                        return self.publish_final(batch_id).await;
                    },
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Batch activation failed");
                        last_error = Some(e);
                    },
                }
            }

            let error = last_error.map_or_else(String::new, |e| e.to_string());
            tracing::error!(error = %error, "Batch activation abandoned");
            self.store
                .fail_operation(
                    batch_id,
                    Some(ErrorDetail {
                        row: 0,
                        error: format!("Batch activation failed: {error}"),
                        data: String::new(),
                    }),
                )
                .await?;
        } else if self.store.fail_operation(batch_id, None).await? {
            tracing::info!(
                processed = progress.processed_rows,
                failed = progress.failed_rows,
                "Batch failed; no records activated"
            );
        }

        self.publish_final(batch_id).await
    }

    async fn publish_final(&self, batch_id: &str) -> Result<BulkStatus, IngestError> {
        let operation = self
            .store
            .get_operation(batch_id)
            .await?
            .ok_or_else(|| IngestError::Cancelled(batch_id.to_string()))?;
        self.publisher.publish(&operation.snapshot());
        Ok(operation.status)
    }

    fn result(
        &self,
        batch_id: &str,
        status: BulkStatus,
        total: i64,
        progress: Progress,
        outcomes: Vec<RowOutcome>,
    ) -> BatchResult {
        BatchResult {
            batch_id: batch_id.to_string(),
            status,
            total,
            processed: progress.processed_rows,
            failed: progress.failed_rows,
            activated: status == BulkStatus::Completed,
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::progress::ProgressRegistry;
    use crate::models::HospitalFilter;
    use crate::store::{HospitalStore, MemoryStore, OperationStore};
    use hdir_ingest::{interpret, prepare, InterpretOptions};

    fn engine(store: Arc<MemoryStore>) -> IngestionEngine {
        IngestionEngine::new(store, Arc::new(ProgressRegistry::new()), 2)
    }

    fn prepared(csv: &str) -> PreparedBatch {
        prepare(&interpret(csv.as_bytes(), InterpretOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn test_clean_batch_is_activated() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let batch = prepared("Name,Address\n\"Clinic X\",\"1 Main St\"\n");

        let op = engine.open_batch(&batch, None).await.unwrap();
        let result = engine.run(&op.id, &batch.rows, RunOptions::default()).await.unwrap();

        assert_eq!(result.status, BulkStatus::Completed);
        assert!(result.activated);
        assert_eq!(result.processed, 1);

        let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].active);
        assert_eq!(records[0].name, "Clinic X");
    }

    #[tokio::test]
    async fn test_any_failure_blocks_activation() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let batch = prepared("name,address,phone\nA,Addr1,555\n,,\nB,,\n");

        let op = engine.open_batch(&batch, None).await.unwrap();
        assert_eq!(op.total_rows, 2);

        let result = engine.run(&op.id, &batch.rows, RunOptions::default()).await.unwrap();
        assert_eq!(result.status, BulkStatus::Failed);
        assert!(!result.activated);
        assert_eq!((result.processed, result.failed), (1, 1));

        let op = store.get_operation(&op.id).await.unwrap().unwrap();
        assert_eq!(op.current_row, 2);
        assert_eq!(op.error_details.len(), 1);
        assert_eq!(op.error_details[0].row, 3);
        assert_eq!(op.error_details[0].error, "Name and address are required");
        assert_eq!(
            store
                .count(&HospitalFilter { active: Some(true), ..Default::default() })
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_checkpoint_interval_still_lands_final_counters() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let mut csv = String::from("name,address\n");
        for i in 0..13 {
            csv.push_str(&format!("H{i},Street {i}\n"));
        }
        let batch = prepared(&csv);
        let op = engine.open_batch(&batch, None).await.unwrap();

        let options = RunOptions {
            checkpoint_interval: 10,
            row_delay: Duration::ZERO,
        };
        let result = engine.run(&op.id, &batch.rows, options).await.unwrap();
        assert_eq!(result.status, BulkStatus::Completed);

        let op = store.get_operation(&op.id).await.unwrap().unwrap();
        assert_eq!((op.current_row, op.processed_rows, op.failed_rows), (13, 13, 0));
    }

    #[tokio::test]
    async fn test_chunk_maps_records_back_to_rows() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let batch = prepared("name,address\nA,1\n,2\nC,3\n");
        let op = engine.open_batch(&batch, None).await.unwrap();

        let options = RunOptions {
            checkpoint_interval: 10,
            row_delay: Duration::ZERO,
        };
        let result = engine.run(&op.id, &batch.rows, options).await.unwrap();
        assert_eq!(result.status, BulkStatus::Failed);
        assert_eq!((result.processed, result.failed), (2, 1));

        let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
        assert_eq!(records[1].name, "C");
        assert!(matches!(result.outcomes[1], RowOutcome::Failed { row: 2, .. }));
        let created: Vec<_> = result
            .outcomes
            .iter()
            .filter_map(|o| match o {
                RowOutcome::Created { row, hospital_id, .. } => Some((*row, *hospital_id)),
                RowOutcome::Failed { .. } => None,
            })
            .collect();
        assert_eq!(created, [(1, records[0].id), (3, records[1].id)]);
    }

    #[tokio::test]
    async fn test_paused_operation_stops_before_next_row() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let batch = prepared("name,address\nA,1\nB,2\n");
        let op = engine.open_batch(&batch, None).await.unwrap();

        store
            .transition(&op.id, &[BulkStatus::InProgress], BulkStatus::Paused, None)
            .await
            .unwrap();
        let result = engine.run(&op.id, &batch.rows, RunOptions::default()).await.unwrap();

        assert_eq!(result.status, BulkStatus::Paused);
        assert!(result.outcomes.is_empty());
        assert_eq!(store.count(&HospitalFilter::batch(&op.id)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_starts_at_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let batch = prepared("name,address\nA,1\nB,2\nC,3\n");
        let op = engine.open_batch(&batch, None).await.unwrap();
        store
            .checkpoint(&op.id, Progress { current_row: 2, processed_rows: 2, failed_rows: 0 }, &[])
            .await
            .unwrap();

        let result = engine.run(&op.id, &batch.rows, RunOptions::default()).await.unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].row(), 3);
        assert_eq!(result.processed, 3);
    }

    #[tokio::test]
    async fn test_all_skipped_upload_fails_empty() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let batch = prepared("name,address,phone\n,,\nnan,none,\n");
        assert_eq!(batch.total_rows(), 0);

        let op = engine.open_batch(&batch, None).await.unwrap();
        let result = engine.run(&op.id, &batch.rows, RunOptions::default()).await.unwrap();
        assert_eq!(result.status, BulkStatus::Failed);
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let store = Arc::new(MemoryStore::new());
        let err = engine(store).run("nope", &[], RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }
}
