//! Update hospital command
//!
//! Partial update of name, address and phone. A blank phone clears it, the
//! same way a blank phone is dropped on create. Activation is owned by the
//! batch pipeline and cannot be changed here.

use serde::Deserialize;

use crate::features::shared::{validate_required, FieldValidationError};
use crate::models::{HospitalPatch, HospitalRecord};
use crate::store::{HospitalStore, RecordStore, StoreError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateHospitalCommand {
    #[serde(skip)]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateHospitalError {
    #[error(transparent)]
    Validation(#[from] FieldValidationError),

    #[error("Hospital not found")]
    NotFound(i64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl UpdateHospitalCommand {
    pub fn validate(&self) -> Result<HospitalPatch, UpdateHospitalError> {
        Ok(HospitalPatch {
            name: self
                .name
                .as_deref()
                .map(|n| validate_required(n, "name"))
                .transpose()?,
            address: self
                .address
                .as_deref()
                .map(|a| validate_required(a, "address"))
                .transpose()?,
            phone: self.phone.as_deref().map(|p| {
                let p = p.trim();
                (!p.is_empty()).then(|| p.to_string())
            }),
            active: None,
        })
    }
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn RecordStore,
    command: UpdateHospitalCommand,
) -> Result<HospitalRecord, UpdateHospitalError> {
    let patch = command.validate()?;

    if patch.is_empty() {
        return store
            .get(command.id)
            .await?
            .ok_or(UpdateHospitalError::NotFound(command.id));
    }

    store
        .update(command.id, patch)
        .await?
        .ok_or(UpdateHospitalError::NotFound(command.id))
}
