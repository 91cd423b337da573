pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    CreateHospitalCommand, CreateHospitalError, DeleteBatchHospitalsCommand,
    DeleteBatchHospitalsError, DeleteHospitalCommand, DeleteHospitalError, UpdateHospitalCommand,
    UpdateHospitalError,
};
pub use queries::{
    GetHospitalError, GetHospitalQuery, HospitalsByBatchError, HospitalsByBatchQuery,
    ListHospitalsError, ListHospitalsQuery, ListHospitalsResponse,
};
pub use routes::hospitals_routes;
