//! Input validation shared by commands

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldValidationError {
    #[error("{field} is required and cannot be empty")]
    Required { field: &'static str },

    #[error("Sleep duration must be between 0 and {max} seconds")]
    RowDelay { max: f64 },
}

/// Trimmed value, or an error when nothing is left
pub fn validate_required(value: &str, field: &'static str) -> Result<String, FieldValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FieldValidationError::Required { field });
    }
    Ok(value.to_string())
}

/// Per-row delay in seconds, defaulting when absent
pub fn validate_row_delay(
    requested: Option<f64>,
    default: f64,
    max: f64,
) -> Result<Duration, FieldValidationError> {
    let secs = requested.unwrap_or(default);
    if !secs.is_finite() || !(0.0..=max).contains(&secs) {
        return Err(FieldValidationError::RowDelay { max });
    }
    Ok(Duration::from_secs_f64(secs))
}
