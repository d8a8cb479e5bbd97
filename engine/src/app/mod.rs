//! Service facade and read models.
//!
//! [`BloodBridge`] is the single entry point the outer surfaces (HTTP, CLI,
//! the sweeper) call into.

pub mod services;
pub mod views;

pub use services::{BloodBridge, BloodBridgeBuilder, DEFAULT_BASE_URL, LifecycleOutcome};
pub use views::{AdminStats, DonorDashboard, Export, HospitalDashboard, ResponsesView};
