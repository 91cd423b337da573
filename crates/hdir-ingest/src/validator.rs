//! Row validation
//!
//! Rules are applied in order: normalize, skip all-empty rows, require name
//! and address. Structural defects found by the interpreter reject the row
//! after the empty check, so a short blank line is still skipped.

use serde::Serialize;

use crate::interpreter::{CandidateRow, InterpretedUpload, RowDefect};

/// Tokens treated as an absent value, compared case-insensitively
const NULL_TOKENS: [&str; 3] = ["", "nan", "none"];

pub const MISSING_REQUIRED: &str = "Name and address are required";
pub const TOO_FEW_COLUMNS: &str = "At least 2 columns required (name, address)";

/// Normalized hospital fields of an accepted row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HospitalFields {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(HospitalFields),
    Skipped,
    Rejected { reason: String },
}

fn normalize(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if NULL_TOKENS.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Classify one candidate row
pub fn validate(row: &CandidateRow) -> Verdict {
    let name = normalize(row.field("name"));
    let address = normalize(row.field("address"));
    let phone = normalize(row.field("phone"));

    if name.is_none() && address.is_none() && phone.is_none() {
        return Verdict::Skipped;
    }

    if let Some(RowDefect::TooFewColumns { .. }) = row.defect {
        return Verdict::Rejected {
            reason: TOO_FEW_COLUMNS.to_string(),
        };
    }

    match (name, address) {
        (Some(name), Some(address)) => Verdict::Accepted(HospitalFields {
            name,
            address,
            phone,
        }),
        _ => Verdict::Rejected {
            reason: MISSING_REQUIRED.to_string(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedStatus {
    Accepted(HospitalFields),
    Rejected { reason: String },
}

/// A non-skipped row ready for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    /// 1-based data-row position in the upload
    pub row_number: usize,
    pub raw_data: String,
    pub status: StagedStatus,
}

/// Validated upload: the rows that count toward a batch's totals
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub rows: Vec<StagedRow>,
    pub skipped: usize,
}

impl PreparedBatch {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn accepted(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r.status, StagedStatus::Accepted(_)))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.total_rows() - self.accepted()
    }
}

/// Run every row of an interpreted upload through [`validate`]
pub fn prepare(upload: &InterpretedUpload) -> PreparedBatch {
    let mut batch = PreparedBatch::default();

    for row in &upload.rows {
        let status = match validate(row) {
            Verdict::Skipped => {
                batch.skipped += 1;
                continue;
            }
            Verdict::Accepted(fields) => StagedStatus::Accepted(fields),
            Verdict::Rejected { reason } => StagedStatus::Rejected { reason },
        };
        batch.rows.push(StagedRow {
            row_number: row.row_number,
            raw_data: row.raw_data(),
            status,
        });
    }

    tracing::debug!(
        total = batch.total_rows(),
        skipped = batch.skipped,
        rejected = batch.rejected(),
        "Upload prepared"
    );

    batch
}

/// Batch id reported by dry runs, which never create a batch
pub const VALIDATION_BATCH_ID: &str = "validation_only";

/// Per-row result of a dry run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Validated {
        row: usize,
        hospital_id: Option<i64>,
        name: String,
    },
    ValidationFailed {
        row: usize,
        error: String,
        data: String,
    },
}

/// Dry-run report, shaped like a bulk upload response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub batch_id: String,
    pub total_hospitals: usize,
    pub processed_hospitals: usize,
    pub failed_hospitals: usize,
    pub processing_time_seconds: f64,
    pub batch_activated: bool,
    pub hospitals: Vec<ValidationOutcome>,
}

impl ValidationReport {
    pub fn from_prepared(batch: &PreparedBatch, elapsed_secs: f64) -> Self {
        let hospitals = batch
            .rows
            .iter()
            .map(|row| match &row.status {
                StagedStatus::Accepted(fields) => ValidationOutcome::Validated {
                    row: row.row_number,
                    hospital_id: None,
                    name: fields.name.clone(),
                },
                StagedStatus::Rejected { reason } => ValidationOutcome::ValidationFailed {
                    row: row.row_number,
                    error: reason.clone(),
                    data: row.raw_data.clone(),
                },
            })
            .collect();

        Self {
            batch_id: VALIDATION_BATCH_ID.to_string(),
            total_hospitals: batch.total_rows(),
            processed_hospitals: batch.accepted(),
            failed_hospitals: batch.rejected(),
            processing_time_seconds: (elapsed_secs * 100.0).round() / 100.0,
            batch_activated: false,
            hospitals,
        }
    }
}
