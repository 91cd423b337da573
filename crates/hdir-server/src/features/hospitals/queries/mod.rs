//! Hospital read operations

pub mod by_batch;
pub mod get;
pub mod list;

pub use by_batch::{HospitalsByBatchError, HospitalsByBatchQuery};
pub use get::{GetHospitalError, GetHospitalQuery};
pub use list::{ListHospitalsError, ListHospitalsQuery, ListHospitalsResponse};
