//! Domain models shared by the store, the ingestion pipeline and the API

pub mod hospital;
pub mod operation;

pub use hospital::{HospitalFilter, HospitalPatch, HospitalRecord, NewHospital};
pub use operation::{
    BulkOperation, BulkStatus, ErrorDetail, NewOperation, Progress, ProgressSnapshot,
};
