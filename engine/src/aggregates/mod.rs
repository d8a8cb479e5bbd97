//! Reducers for the two mutable tables.
//!
//! - [`donor`]: donor registry (registration, review, donation bookkeeping)
//! - [`request`]: emergency request lifecycle and response ledgers

pub mod donor;
pub mod request;

pub use donor::{DonorAction, DonorEnvironment, DonorReducer, DonorRegistration, DonorState};
pub use request::{
    DonorDirectory, EmergencyAction, EmergencyEnvironment, EmergencyReducer, EmergencyState, RequestForm,
};
