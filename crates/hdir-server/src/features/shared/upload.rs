//! Multipart CSV upload extraction

use axum::extract::Multipart;
use thiserror::Error;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read multipart data: {0}")]
    Multipart(String),

    #[error("No file field found in multipart data")]
    MissingFile,

    #[error("Only CSV files are allowed")]
    NotCsv,

    #[error("File is empty")]
    Empty,
}

/// A received upload, not yet interpreted
#[derive(Debug, Clone)]
pub struct CsvUpload {
    pub filename: String,
    pub content: Vec<u8>,
}

pub fn is_csv_filename(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".csv")
}

/// Read the `file` field and check it is a non-empty `.csv` upload
pub async fn read_csv_upload(mut multipart: Multipart) -> Result<CsvUpload, UploadError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !is_csv_filename(&filename) {
            return Err(UploadError::NotCsv);
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| UploadError::Multipart(e.to_string()))?;
        upload = Some(CsvUpload {
            filename,
            content: data.to_vec(),
        });
    }

    let upload = upload.ok_or(UploadError::MissingFile)?;
    if upload.content.is_empty() {
        return Err(UploadError::Empty);
    }

    tracing::debug!(filename = %upload.filename, bytes = upload.content.len(), "CSV upload received");
    Ok(upload)
}
