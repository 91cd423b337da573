//! Operation lifecycle commands: pause, resume and delete

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::features::shared::{validate_row_delay, FieldValidationError};
use crate::ingest::{
    BatchScheduler, BulkOperationTracker, IngestionEngine, ResumeSummary, RunOptions,
    SchedulerError, TrackerError,
};

pub const PAUSED_MESSAGE: &str = "Operation paused successfully";
pub const DELETED_MESSAGE: &str = "Operation and associated data deleted successfully";

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PauseOperationCommand {
    pub id: String,
}

#[tracing::instrument(skip(tracker))]
pub async fn pause(
    tracker: &BulkOperationTracker,
    command: PauseOperationCommand,
) -> Result<MessageResponse, TrackerError> {
    tracker.pause(&command.id).await?;
    Ok(MessageResponse {
        message: PAUSED_MESSAGE.to_string(),
    })
}

/// Request body for resume; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeOperationCommand {
    #[serde(skip)]
    pub id: String,
    /// 1-based row to restart from; defaults to the row after the checkpoint
    #[serde(default)]
    pub from_row: Option<i64>,
    /// Per-row delay in seconds for the resumed pass
    #[serde(default)]
    pub sleep_duration: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResumeOperationError {
    #[error(transparent)]
    Validation(#[from] FieldValidationError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Reopen the batch and schedule the rest of its rows
#[tracing::instrument(skip(engine, tracker, scheduler, ingest))]
pub async fn resume(
    engine: Arc<IngestionEngine>,
    tracker: &BulkOperationTracker,
    scheduler: &BatchScheduler,
    command: ResumeOperationCommand,
    ingest: &IngestConfig,
) -> Result<ResumeSummary, ResumeOperationError> {
    let row_delay = validate_row_delay(
        command.sleep_duration,
        ingest.default_row_delay_secs,
        ingest.max_row_delay_secs,
    )?;

    // A paused pass may not have reached its next row boundary yet
    if scheduler.is_running(&command.id) {
        return Err(TrackerError::Busy(command.id).into());
    }

    let plan = tracker.prepare_resume(&command.id, command.from_row).await?;
    let summary = plan.summary();

    let id = plan.operation.id.clone();
    let batch_id = id.clone();
    let rows = plan.rows;
    let submitted = scheduler.submit(&id, async move {
        engine
            .run(&batch_id, &rows, RunOptions::every_row(row_delay))
            .await
    });
    if let Err(SchedulerError::AlreadyRunning(id)) = submitted {
        // The earlier pass is still winding down; hand the batch back paused
        tracing::warn!(batch_id = %id, "Resume raced with a running pass");
        tracker.pause(&id).await?;
        return Err(TrackerError::Busy(id).into());
    }

    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct DeleteOperationCommand {
    pub id: String,
}

#[tracing::instrument(skip(tracker))]
pub async fn delete(
    tracker: &BulkOperationTracker,
    command: DeleteOperationCommand,
) -> Result<MessageResponse, TrackerError> {
    tracker.delete(&command.id).await?;
    Ok(MessageResponse {
        message: DELETED_MESSAGE.to_string(),
    })
}
