//! Helpers shared by feature slices

pub mod upload;
pub mod validation;

pub use upload::{read_csv_upload, CsvUpload, UploadError};
pub use validation::{validate_required, validate_row_delay, FieldValidationError};
