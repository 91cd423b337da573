//! Hospital directory upload handling
//!
//! Pure functions over upload bytes: [`interpreter`] reads CSV into candidate
//! rows and [`validator`] classifies them. Nothing here touches storage.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
pub mod interpreter;
pub mod validator;

use std::time::Instant;

pub use error::{InterpretError, InterpretResult};
pub use interpreter::{
    interpret, CandidateRow, InterpretOptions, InterpretedUpload, RowDefect, DEFAULT_MAX_ROWS,
};
pub use validator::{
    prepare, validate, HospitalFields, PreparedBatch, StagedRow, StagedStatus, ValidationOutcome,
    ValidationReport, Verdict, VALIDATION_BATCH_ID,
};

/// Interpret and validate an upload without creating anything
pub fn dry_run(raw: &[u8], options: InterpretOptions) -> InterpretResult<ValidationReport> {
    let started = Instant::now();
    let upload = interpret(raw, options)?;
    let batch = prepare(&upload);
    Ok(ValidationReport::from_prepared(
        &batch,
        started.elapsed().as_secs_f64(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_headerless() {
        let report = dry_run(b"1,2,3\n4,5\n", InterpretOptions::default()).unwrap();
        assert_eq!(report.total_hospitals, 2);
        assert_eq!(report.processed_hospitals, 2);
        assert_eq!(report.failed_hospitals, 0);
    }

    #[test]
    fn test_dry_run_propagates_input_errors() {
        let err = dry_run(b"phone\n555\n", InterpretOptions::default()).unwrap_err();
        assert_eq!(err.code(), "MISSING_COLUMNS");
    }
}
