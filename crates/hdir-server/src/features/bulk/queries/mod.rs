//! Bulk read operations

pub mod operations;
pub mod status;

pub use operations::{GetOperationQuery, ListOperationsError, ListOperationsQuery};
pub use status::{BulkStatusQuery, BulkStatusResponse};
