//! # BloodBridge Testing
//!
//! Testing utilities and helpers for BloodBridge reducers and stores.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clock, id generator)
//! - An in-memory record store that counts saves
//! - The [`ReducerTest`] scenario harness for reducers whose state records
//!   the last rejection, with follow-up effect checks
//!
//! ## Example
//!
//! ```ignore
//! use bloodbridge_testing::{InMemoryRecordStore, test_clock};
//!
//! #[tokio::test]
//! async fn registers_a_donor() {
//!     let records = Arc::new(InMemoryRecordStore::new());
//!     let app = BloodBridge::builder(records.clone()).clock(test_clock()).build();
//!
//!     app.register_donor(form).await?;
//!
//!     assert_eq!(records.records(Table::Donors).len(), 1);
//! }
//! ```

use bloodbridge_core::environment::{Clock, IdGenerator};
use chrono::{DateTime, Utc};


pub use reducer_test::{ReducerTest, Rejecting, assertions};

/// Mock implementations of Environment traits and collaborators.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use bloodbridge_core::record_store::{Record, RecordStore, RecordStoreError, Table};
    use chrono::Duration;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Controllable clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance`]. Clones share the same time, so a test can keep
    /// one handle while the environment owns another.
    ///
    /// # Example
    ///
    /// ```
    /// use bloodbridge_testing::mocks::FixedClock;
    /// use bloodbridge_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    ///
    /// clock.advance(Duration::seconds(30));
    /// assert_eq!(clock.now() - time1, Duration::seconds(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `prefix` followed by a zero-padded counter.
    #[derive(Debug, Clone)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: Arc<AtomicU64>,
    }

    impl SequentialIdGenerator {
        /// Ids `"{prefix}0001"`, `"{prefix}0002"`, ...
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: Arc::new(AtomicU64::new(1)),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new("id")
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::Relaxed);
            format!("{}{n:04}", self.prefix)
        }
    }

    #[derive(Debug, Default)]
    struct Tables {
        records: HashMap<Table, Vec<Record>>,
        saves: HashMap<Table, usize>,
    }

    /// In-memory record store for tests.
    ///
    /// Tables start empty. Every `save` replaces the table and bumps a
    /// per-table counter that tests can inspect.
    #[derive(Debug, Default)]
    pub struct InMemoryRecordStore {
        tables: Mutex<Tables>,
    }

    impl InMemoryRecordStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Replace `table` without counting a save
        pub fn seed(&self, table: Table, records: Vec<Record>) {
            let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.records.insert(table, records);
        }

        /// Snapshot of `table`'s records
        #[must_use]
        pub fn records(&self, table: Table) -> Vec<Record> {
            let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.records.get(&table).cloned().unwrap_or_default()
        }

        /// Number of saves performed on `table`
        #[must_use]
        pub fn save_count(&self, table: Table) -> usize {
            let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.saves.get(&table).copied().unwrap_or(0)
        }
    }

    impl RecordStore for InMemoryRecordStore {
        fn load(
            &self,
            table: Table,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, RecordStoreError>> + Send + '_>>
        {
            let records = self.records(table);
            Box::pin(async move { Ok(records) })
        }

        fn save(
            &self,
            table: Table,
            records: Vec<Record>,
        ) -> Pin<Box<dyn Future<Output = Result<(), RecordStoreError>> + Send + '_>> {
            {
                let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
                tables.records.insert(table, records);
                *tables.saves.entry(table).or_insert(0) += 1;
            }
            Box::pin(async { Ok(()) })
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Install a test-friendly tracing subscriber, honouring `RUST_LOG`.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryRecordStore, SequentialIdGenerator, test_clock};
