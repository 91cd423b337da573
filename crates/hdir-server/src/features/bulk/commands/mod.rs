//! Bulk write operations

pub mod background;
pub mod lifecycle;
pub mod upload;
pub mod validate;

pub use background::{BackgroundUploadCommand, BackgroundUploadError, BackgroundUploadResponse};
pub use lifecycle::{
    DeleteOperationCommand, MessageResponse, PauseOperationCommand, ResumeOperationCommand,
    ResumeOperationError,
};
pub use upload::{BulkUploadCommand, BulkUploadError, BulkUploadResponse};
pub use validate::ValidateUploadCommand;
