//! Create hospital command
//!
//! A single hospital goes through the same pipeline as an upload: it becomes
//! a one-row batch, so its `creation_batch_id` names a real operation and it
//! is activated by the same gate.

use std::sync::Arc;

use hdir_ingest::{HospitalFields, PreparedBatch, StagedRow, StagedStatus};
use serde::Deserialize;

use crate::features::shared::{validate_required, FieldValidationError};
use crate::ingest::{
    BatchScheduler, IngestError, IngestionEngine, RowOutcome, RunOptions, SchedulerError,
};
use crate::models::HospitalRecord;
use crate::store::{HospitalStore, RecordStore, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHospitalCommand {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateHospitalError {
    #[error(transparent)]
    Validation(#[from] FieldValidationError),

    #[error("Hospital could not be created: {0}")]
    NotCreated(String),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CreateHospitalCommand {
    /// Normalized fields; a blank phone is dropped
    pub fn validate(&self) -> Result<HospitalFields, CreateHospitalError> {
        Ok(HospitalFields {
            name: validate_required(&self.name, "name")?,
            address: validate_required(&self.address, "address")?,
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }
}

#[tracing::instrument(skip(engine, scheduler, store))]
pub async fn handle(
    engine: Arc<IngestionEngine>,
    scheduler: &BatchScheduler,
    store: &dyn RecordStore,
    command: CreateHospitalCommand,
) -> Result<HospitalRecord, CreateHospitalError> {
    let fields = command.validate()?;

    let batch = PreparedBatch {
        rows: vec![StagedRow {
            row_number: 1,
            raw_data: serde_json::to_string(&fields).unwrap_or_default(),
            status: StagedStatus::Accepted(fields),
        }],
        skipped: 0,
    };

    let operation = engine.open_batch(&batch, None).await?;
    let batch_id = operation.id.clone();
    let rows = batch.rows;
    let result = scheduler
        .run(&operation.id, async move {
            engine.run(&batch_id, &rows, RunOptions::default()).await
        })
        .await?;

    let hospital_id = match result.outcomes.into_iter().next() {
        Some(RowOutcome::Created { hospital_id, .. }) => hospital_id,
        Some(RowOutcome::Failed { error, .. }) => return Err(CreateHospitalError::NotCreated(error)),
        None => {
            return Err(CreateHospitalError::NotCreated(format!(
                "batch '{}' ended {} before the row was attempted",
                operation.id, result.status
            )))
        },
    };

    store
        .get(hospital_id)
        .await?
        .ok_or_else(|| CreateHospitalError::NotCreated(format!("hospital {hospital_id} vanished")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str, address: &str, phone: Option<&str>) -> CreateHospitalCommand {
        CreateHospitalCommand {
            name: name.into(),
            address: address.into(),
            phone: phone.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_trims_and_drops_blank_phone() {
        let fields = command(" General ", "1 Main St", Some("  ")).validate().unwrap();
        assert_eq!(fields.name, "General");
        assert_eq!(fields.phone, None);
    }

    #[test]
    fn test_validate_requires_name_and_address() {
        assert!(command("", "1 Main St", None).validate().is_err());
        assert!(command("General", " ", None).validate().is_err());
    }
}
