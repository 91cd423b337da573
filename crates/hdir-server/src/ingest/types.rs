//! Result types of an ingestion pass

use serde::Serialize;

use crate::models::BulkStatus;

/// What happened to one non-skipped row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Created {
        row: usize,
        hospital_id: i64,
        name: String,
    },
    Failed {
        row: usize,
        error: String,
        data: String,
    },
}

impl RowOutcome {
    pub fn row(&self) -> usize {
        match self {
            RowOutcome::Created { row, .. } | RowOutcome::Failed { row, .. } => *row,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, RowOutcome::Created { .. })
    }
}

/// Summary of one pass over a batch
///
/// Counters are cumulative across resumes; `outcomes` covers only the rows
/// attempted in this pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub status: BulkStatus,
    pub total: i64,
    pub processed: i64,
    pub failed: i64,
    pub activated: bool,
    pub outcomes: Vec<RowOutcome>,
}
