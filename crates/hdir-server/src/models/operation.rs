use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bulk operation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    InProgress,
    Completed,
    Failed,
    Paused,
}

impl BulkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStatus::InProgress => "in_progress",
            BulkStatus::Completed => "completed",
            BulkStatus::Failed => "failed",
            BulkStatus::Paused => "paused",
        }
    }

    /// Completed and failed end a pass over the rows
    pub fn is_terminal(&self) -> bool {
        matches!(self, BulkStatus::Completed | BulkStatus::Failed)
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self, BulkStatus::Paused | BulkStatus::Failed)
    }
}

impl std::fmt::Display for BulkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown bulk operation status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for BulkStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(BulkStatus::InProgress),
            "completed" => Ok(BulkStatus::Completed),
            "failed" => Ok(BulkStatus::Failed),
            "paused" => Ok(BulkStatus::Paused),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One failed row, or a batch-level fault when `row` is 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub row: i64,
    pub error: String,
    pub data: String,
}

/// Durable progress record for one batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperation {
    /// Batch id
    pub id: String,
    pub status: BulkStatus,
    /// Non-skipped rows in the upload
    pub total_rows: i64,
    pub processed_rows: i64,
    pub failed_rows: i64,
    /// Non-skipped rows attempted so far; the resume checkpoint
    pub current_row: i64,
    pub error_details: Vec<ErrorDetail>,
    #[serde(skip)]
    pub file_content: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkOperation {
    pub fn progress(&self) -> Progress {
        Progress {
            current_row: self.current_row,
            processed_rows: self.processed_rows,
            failed_rows: self.failed_rows,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(&self.id, self.status, self.total_rows, self.progress())
    }

    pub fn has_content(&self) -> bool {
        self.file_content.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Values for a new operation
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub id: String,
    pub total_rows: i64,
    pub file_content: Option<Vec<u8>>,
}

/// Counters written at each checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current_row: i64,
    pub processed_rows: i64,
    pub failed_rows: i64,
}

/// What progress subscribers see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub batch_id: String,
    pub status: BulkStatus,
    pub total_rows: i64,
    pub current_row: i64,
    pub processed_rows: i64,
    pub failed_rows: i64,
    pub progress_percentage: f64,
}

impl ProgressSnapshot {
    pub fn new(batch_id: &str, status: BulkStatus, total_rows: i64, progress: Progress) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            status,
            total_rows,
            current_row: progress.current_row,
            processed_rows: progress.processed_rows,
            failed_rows: progress.failed_rows,
            progress_percentage: percentage(progress.current_row, total_rows),
        }
    }
}

/// `current / total * 100` rounded to two places; 0 for an empty batch
pub fn percentage(current: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = current as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}
