//! Upload interpretation errors
//!
//! Every variant is an *input* error: it is reported to the uploader before a
//! batch exists and cannot be retried without a corrected file.

use thiserror::Error;

pub type InterpretResult<T> = std::result::Result<T, InterpretError>;

#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("File is not valid UTF-8 encoded text (invalid byte at offset {valid_up_to})")]
    Decode { valid_up_to: usize },

    #[error("File is empty or contains only whitespace")]
    EmptyInput,

    #[error(
        "Missing required columns: {}. Available columns: {}",
        missing.join(", "),
        available.join(", ")
    )]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Maximum {max} hospitals allowed per CSV file, found {found}")]
    TooManyRows { max: usize, found: usize },

    #[error("CSV file must have at least one data row")]
    NoDataRows,

    #[error("Row {row}: At least 2 columns required (name, address)")]
    TooFewColumns { row: usize },

    #[error("Invalid CSV file: {0}")]
    Csv(#[from] csv::Error),
}

impl InterpretError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            InterpretError::Decode { .. } => "DECODE_ERROR",
            InterpretError::EmptyInput => "EMPTY_INPUT",
            InterpretError::MissingColumns { .. } => "MISSING_COLUMNS",
            InterpretError::TooManyRows { .. } => "TOO_MANY_ROWS",
            InterpretError::NoDataRows => "NO_DATA_ROWS",
            InterpretError::TooFewColumns { .. } => "TOO_FEW_COLUMNS",
            InterpretError::Csv(_) => "INVALID_CSV",
        }
    }
}
