//! Background bulk upload
//!
//! The batch is created and handed to the scheduler; the request returns at
//! once with zero progress. Rows are checkpointed one by one and the raw
//! upload is retained (when configured) so the batch can be resumed.

use std::sync::Arc;
use std::time::Duration;

use hdir_ingest::{interpret, prepare, InterpretError, InterpretOptions};
use serde::Serialize;

use crate::features::shared::CsvUpload;
use crate::ingest::{BatchScheduler, IngestError, IngestionEngine, RunOptions, SchedulerError};
use crate::models::BulkStatus;

pub const STARTED_MESSAGE: &str = "Bulk operation started. Check status using the batch_id.";

#[derive(Debug, Clone)]
pub struct BackgroundUploadCommand {
    pub upload: CsvUpload,
    pub options: InterpretOptions,
    pub row_delay: Duration,
    pub retain_content: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackgroundUploadResponse {
    pub batch_id: String,
    pub status: BulkStatus,
    pub total_rows: i64,
    pub current_row: i64,
    pub processed_rows: i64,
    pub failed_rows: i64,
    pub progress_percentage: f64,
    pub message: String,
    pub sleep_duration: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum BackgroundUploadError {
    #[error(transparent)]
    Input(#[from] InterpretError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[tracing::instrument(skip(engine, scheduler, command), fields(filename = %command.upload.filename))]
pub async fn handle(
    engine: Arc<IngestionEngine>,
    scheduler: &BatchScheduler,
    command: BackgroundUploadCommand,
) -> Result<BackgroundUploadResponse, BackgroundUploadError> {
    let batch = prepare(&interpret(&command.upload.content, command.options)?);
    let content = command.retain_content.then_some(command.upload.content);
    let operation = engine.open_batch(&batch, content).await?;

    let batch_id = operation.id.clone();
    let rows = batch.rows;
    let options = RunOptions::every_row(command.row_delay);
    scheduler.submit(&operation.id, async move {
        engine.run(&batch_id, &rows, options).await
    })?;

    let snapshot = operation.snapshot();
    Ok(BackgroundUploadResponse {
        batch_id: snapshot.batch_id,
        status: snapshot.status,
        total_rows: snapshot.total_rows,
        current_row: snapshot.current_row,
        processed_rows: snapshot.processed_rows,
        failed_rows: snapshot.failed_rows,
        progress_percentage: snapshot.progress_percentage,
        message: STARTED_MESSAGE.to_string(),
        sleep_duration: command.row_delay.as_secs_f64(),
    })
}
