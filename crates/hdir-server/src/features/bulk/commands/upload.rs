//! Synchronous bulk upload
//!
//! The whole batch is ingested inside the request, checkpointing every
//! `checkpoint_interval` rows. The pass runs as a supervised batch task, so
//! a store fault or a dropped connection still ends the operation `failed`
//! rather than `in_progress`. The raw upload is not retained, so a batch
//! created here cannot be resumed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hdir_ingest::{interpret, prepare, InterpretError, InterpretOptions};
use serde::Serialize;

use crate::features::shared::CsvUpload;
use crate::ingest::{
    BatchScheduler, IngestError, IngestionEngine, RowOutcome, RunOptions, SchedulerError,
};

#[derive(Debug, Clone)]
pub struct BulkUploadCommand {
    pub upload: CsvUpload,
    pub options: InterpretOptions,
    pub checkpoint_interval: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkUploadResponse {
    pub batch_id: String,
    pub total_hospitals: i64,
    pub processed_hospitals: i64,
    pub failed_hospitals: i64,
    pub processing_time_seconds: f64,
    pub batch_activated: bool,
    pub hospitals: Vec<RowOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum BulkUploadError {
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
    command: BulkUploadCommand,
) -> Result<BulkUploadResponse, BulkUploadError> {
    let started = Instant::now();

    let batch = prepare(&interpret(&command.upload.content, command.options)?);
    let operation = engine.open_batch(&batch, None).await?;

    let options = RunOptions {
        checkpoint_interval: command.checkpoint_interval,
        row_delay: Duration::ZERO,
    };
    let batch_id = operation.id.clone();
    let rows = batch.rows;
    let result = scheduler
        .run(&operation.id, async move {
            engine.run(&batch_id, &rows, options).await
        })
        .await?;

    let elapsed = started.elapsed().as_secs_f64();
    Ok(BulkUploadResponse {
        batch_id: result.batch_id,
        total_hospitals: result.total,
        processed_hospitals: result.processed,
        failed_hospitals: result.failed,
        processing_time_seconds: (elapsed * 100.0).round() / 100.0,
        batch_activated: result.activated,
        hospitals: result.outcomes,
    })
}
