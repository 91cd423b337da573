pub mod commands;
pub mod queries;
pub mod routes;
pub mod ws;

pub use commands::{
    BackgroundUploadCommand, BackgroundUploadError, BackgroundUploadResponse, BulkUploadCommand,
    BulkUploadError, BulkUploadResponse, DeleteOperationCommand, PauseOperationCommand,
    ResumeOperationCommand, ResumeOperationError, ValidateUploadCommand,
};
pub use queries::{
    BulkStatusQuery, BulkStatusResponse, GetOperationQuery, ListOperationsError,
    ListOperationsQuery,
};
pub use routes::{operations_routes, upload_routes};
pub use ws::progress_routes;
