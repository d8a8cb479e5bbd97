//! BloodBridge - emergency blood request lifecycle and donor matching
//!
//! Hospitals and members of the public raise emergency requests; approved
//! requests notify nearby eligible donors, who accept or decline within a
//! fixed response window. Confirmed donations start a cooldown during which
//! the donor is not contacted again.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────────────────── BloodBridge facade ─────────────────────────────┐
//!  │                                                                               │
//!  │   Store<DonorState>  ◀── DonorDirectory ──  Store<EmergencyState>             │
//!  │         │                                        │        │                   │
//!  │   DonorReducer                          EmergencyReducer  └─ Effect::Future   │
//!  │                                                                │              │
//!  │                                              MatchingOrchestrator             │
//!  │                                              (geo filter, cooldown, notifier) │
//!  └───────────────────────────────────────────────────────────────────────────────┘
//!                      │
//!                RecordStore (JSON files, one per table)
//! ```
//!
//! Every mutation of a table goes through that table's [`bloodbridge_runtime::Store`],
//! which serializes dispatches, so concurrent responses to the same request
//! can never overwrite one another.
//!
//! # Request lifecycle
//!
//! ```text
//! PendingAdmin ──approve──▶ Active ──confirm(success)──▶ Resolved
//!                            │
//!                            └─ donors notified once, 900 s response window
//! ```
//!
//! See [`app::BloodBridge`] for the operations and [`aggregates`] for the
//! reducers and their tests.

#![forbid(unsafe_code)]

pub mod aggregates;
pub mod app;
pub mod config;
pub mod error;
pub mod matching;
pub mod metrics;
pub mod mocks;
pub mod notify;
pub mod sweeper;
pub mod types;

pub use app::{BloodBridge, BloodBridgeBuilder, LifecycleOutcome};
pub use config::Config;
pub use error::{ErrorKind, LifecycleError, Result, ServiceError};
pub use sweeper::ExpirySweeper;
