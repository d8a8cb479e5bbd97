//! Record store abstraction: whole-table load and replace.
//!
//! The store holds one ordered sequence of JSON records per logical table.
//! It offers no per-record operations and no transactions; callers that
//! read-modify-write a table must serialize their writes (the runtime `Store`
//! does this with one write lock per table).
//!
//! # Implementations
//!
//! - `JsonFileStore` (in `bloodbridge-runtime`): one JSON array file per table
//! - `InMemoryRecordStore` (in `bloodbridge-testing`): fast, deterministic tests

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A single persisted record.
pub type Record = serde_json::Value;

/// Logical tables known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Registered blood donors
    Donors,
    /// Hospital staff accounts (owned by the authentication collaborator)
    Staff,
    /// Emergency blood requests and their response ledgers
    EmergencyRequests,
}

impl Table {
    /// All tables, in a stable order.
    pub const ALL: [Table; 3] = [Table::Donors, Table::Staff, Table::EmergencyRequests];

    /// Stable table name, used in logs, metrics and file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Table::Donors => "blood_donors",
            Table::Staff => "hospital_staff",
            Table::EmergencyRequests => "emergency_requests",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur during record store operations.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// The backing medium could not be read or written.
    #[error("I/O error on table {table}: {message}")]
    Io {
        /// Table being accessed
        table: Table,
        /// Underlying error message
        message: String,
    },

    /// The persisted data is not a JSON array of records.
    #[error("Corrupt table {table}: {message}")]
    Corrupt {
        /// Table being accessed
        table: Table,
        /// Parse error message
        message: String,
    },
}

/// Whole-table persistence collaborator.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the store can be shared as
/// `Arc<dyn RecordStore>` across the runtime, effects and background tasks.
pub trait RecordStore: Send + Sync {
    /// Load every record of `table`, in stored order.
    ///
    /// A table that was never saved loads as an empty sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] if the table cannot be read or parsed.
    fn load(
        &self,
        table: Table,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, RecordStoreError>> + Send + '_>>;

    /// Replace the entire contents of `table` with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] if the table cannot be written.
    fn save(
        &self,
        table: Table,
        records: Vec<Record>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RecordStoreError>> + Send + '_>>;
}
