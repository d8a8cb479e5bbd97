//! # BloodBridge Runtime
//!
//! Runtime implementation for the BloodBridge reducer architecture.
//!
//! ## Core Components
//!
//! - **Store**: Owns one logical table. Every action is applied as a
//!   load → reduce → save cycle under a single write lock, so two writers to the
//!   same table can never lose each other's updates.
//! - **Effect Executor**: Runs effect descriptions after the write lock is
//!   released and feeds produced actions back into the store.
//! - **`JsonFileStore`**: One JSON array file per table.
//! - **Metrics**: Prometheus exporter and store-level metrics.
//!
//! ## Example
//!
//! ```ignore
//! use bloodbridge_runtime::Store;
//!
//! let store = Store::new(Table::Donors, records, DonorReducer, environment);
//!
//! let dispatch = store.send(DonorAction::SetApproval { .. }).await?;
//! if let Some(error) = &dispatch.state.last_error { .. }
//! ```

use bloodbridge_core::record_store::{Record, Table};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// JSON file backed record store
pub mod file_store;

/// Prometheus metrics for observability
pub mod metrics;

pub use file_store::JsonFileStore;
pub use store::{Dispatch, Store, execute_effects};

/// Error types for the Store runtime
pub mod error {
    use bloodbridge_core::record_store::{RecordStoreError, Table};
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// The record store failed to load or save a table
        #[error(transparent)]
        RecordStore(#[from] RecordStoreError),

        /// A persisted record does not match the table's record shape
        #[error("Failed to decode a record of table {table}: {source}")]
        Decode {
            /// Table being decoded
            table: Table,
            /// Underlying serde error
            #[source]
            source: serde_json::Error,
        },

        /// In-memory state could not be turned back into records
        #[error("Failed to encode a record of table {table}: {source}")]
        Encode {
            /// Table being encoded
            table: Table,
            /// Underlying serde error
            #[source]
            source: serde_json::Error,
        },
    }
}

pub use error::StoreError;

/// Reducer state that is persisted as the records of one table.
///
/// The runtime rebuilds the state from the table on every action, so
/// anything that is not part of the records (such as a per-call
/// `last_error`) starts out empty for each dispatch.
pub trait TableState: Sized {
    /// Persisted shape of one record
    type Record: Serialize + DeserializeOwned;

    /// Build state from the table's records, in stored order
    fn from_records(records: Vec<Self::Record>) -> Self;

    /// Records to persist, in a stable order
    fn to_records(&self) -> Vec<Self::Record>;
}

fn decode<S: TableState>(table: Table, records: Vec<Record>) -> Result<S, StoreError> {
    let records = records
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<S::Record>, _>>()
        .map_err(|source| StoreError::Decode { table, source })?;
    Ok(S::from_records(records))
}

fn encode<S: TableState>(table: Table, state: &S) -> Result<Vec<Record>, StoreError> {
    state
        .to_records()
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StoreError::Encode { table, source })
}

/// The Store and the effect executor
pub mod store {
    use super::{StoreError, TableState, decode, encode, metrics::StoreMetrics};
    use bloodbridge_core::effect::Effect;
    use bloodbridge_core::record_store::{RecordStore, Table};
    use bloodbridge_core::reducer::Reducer;
    use bloodbridge_core::SmallVec;
    use futures::future::join_all;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::sync::Mutex;

    type EffectVec<A> = SmallVec<[Effect<A>; 4]>;

    /// Result of sending an action through a [`Store`].
    #[derive(Debug, Clone)]
    pub struct Dispatch<S, A> {
        /// State right after the sent action was reduced (and persisted)
        pub state: S,
        /// Actions produced by effects, in the order they were applied
        pub feedback: Vec<A>,
    }

    /// The Store - serialized writer for one logical table
    ///
    /// The Store manages:
    /// 1. The table (loaded from and saved to the record store on each action)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Exactly one `Store` must exist per table in a process; its write lock is
    /// what makes the whole-table load/replace pattern safe.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        table: Table,
        records: Arc<dyn RecordStore>,
        reducer: R,
        environment: E,
        write_lock: Mutex<()>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync,
        S: TableState + Send,
        A: Clone + Send + 'static,
        E: Send + Sync,
    {
        /// Create a store for `table`
        #[must_use]
        pub fn new(table: Table, records: Arc<dyn RecordStore>, reducer: R, environment: E) -> Self {
            Self {
                table,
                records,
                reducer,
                environment,
                write_lock: Mutex::new(()),
            }
        }

        /// The table this store owns
        #[must_use]
        pub const fn table(&self) -> Table {
            self.table
        }

        /// Load a read-only snapshot of the table.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError`] if the table cannot be loaded or decoded.
        pub async fn state(&self) -> Result<S, StoreError> {
            let records = self.records.load(self.table).await?;
            decode(self.table, records)
        }

        /// Send an action through the store.
        ///
        /// The action is reduced against freshly loaded state while the table's
        /// write lock is held, and the table is saved only if the records
        /// changed. Effects run after the lock is released; every action they
        /// produce is applied the same way before this call returns.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError`] if a load, decode, encode or save fails.
        #[tracing::instrument(skip_all, fields(table = %self.table), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<Dispatch<S, A>, StoreError> {
            let (state, effects) = self.apply(action).await?;

            let mut feedback = Vec::new();
            let mut pending: VecDeque<A> = execute_effects(effects).await.into();
            while let Some(next) = pending.pop_front() {
                tracing::trace!("Effect produced an action, feeding it back");
                feedback.push(next.clone());
                let (_, effects) = self.apply(next).await?;
                pending.extend(execute_effects(effects).await);
            }

            Ok(Dispatch { state, feedback })
        }

        async fn apply(&self, action: A) -> Result<(S, EffectVec<A>), StoreError> {
            let wait_started = Instant::now();
            let _guard = self.write_lock.lock().await;
            StoreMetrics::record_lock_wait(self.table, wait_started.elapsed());

            let records = self.records.load(self.table).await?;
            let mut state: S = decode(self.table, records)?;
            let before = encode(self.table, &state)?;

            let effects = self.reducer.reduce(&mut state, action, &self.environment);

            let after = encode(self.table, &state)?;
            if before != after {
                self.records.save(self.table, after).await?;
                StoreMetrics::record_write(self.table);
                tracing::debug!(table = %self.table, "Table saved");
            }

            Ok((state, effects))
        }
    }

    /// Execute effects concurrently and collect the actions they produce,
    /// in the order the effects were returned.
    pub async fn execute_effects<A, I>(effects: I) -> Vec<A>
    where
        A: Send + 'static,
        I: IntoIterator<Item = Effect<A>>,
    {
        let running = effects.into_iter().filter_map(|effect| match effect {
            Effect::None => None,
            Effect::Future(fut) => Some(fut),
        });
        join_all(running).await.into_iter().flatten().collect()
    }
}
