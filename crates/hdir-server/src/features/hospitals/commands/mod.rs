//! Hospital write operations

pub mod create;
pub mod delete;
pub mod delete_batch;
pub mod update;

pub use create::{CreateHospitalCommand, CreateHospitalError};
pub use delete::{DeleteHospitalCommand, DeleteHospitalError, DeleteHospitalResponse};
pub use delete_batch::{
    DeleteBatchHospitalsCommand, DeleteBatchHospitalsError, DeleteBatchHospitalsResponse,
};
pub use update::{UpdateHospitalCommand, UpdateHospitalError};
