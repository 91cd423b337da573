//! Dry-run validation of an upload; nothing is created

use hdir_ingest::{dry_run, InterpretError, InterpretOptions, ValidationReport};

use crate::features::shared::CsvUpload;

#[derive(Debug, Clone)]
pub struct ValidateUploadCommand {
    pub upload: CsvUpload,
    pub options: InterpretOptions,
}

#[tracing::instrument(skip(command), fields(filename = %command.upload.filename))]
pub fn handle(command: ValidateUploadCommand) -> Result<ValidationReport, InterpretError> {
    let report = dry_run(&command.upload.content, command.options)?;
    tracing::debug!(
        total = report.total_hospitals,
        failed = report.failed_hospitals,
        "Upload validated"
    );
    Ok(report)
}
