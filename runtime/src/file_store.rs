//! JSON file record store.
//!
//! Each table lives in `<dir>/<table>.json` as a pretty-printed JSON array.
//! A missing file is an empty table. Saves write a sibling temp file and
//! rename it over the table file, so readers never observe a half-written
//! table.

use bloodbridge_core::record_store::{Record, RecordStore, RecordStoreError, Table};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Record store backed by one JSON file per table.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store tables under `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the table files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `table`'s file
    #[must_use]
    pub fn path(&self, table: Table) -> PathBuf {
        self.dir.join(format!("{}.json", table.name()))
    }

    async fn read_table(&self, table: Table) -> Result<Vec<Record>, RecordStoreError> {
        let path = self.path(table);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(%table, path = %path.display(), "Table file missing, treating as empty");
                return Ok(Vec::new());
            },
            Err(e) => {
                return Err(RecordStoreError::Io {
                    table,
                    message: e.to_string(),
                });
            },
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice::<Vec<Record>>(&bytes).map_err(|e| {
            tracing::error!(%table, path = %path.display(), error = %e, "Table file is corrupt");
            RecordStoreError::Corrupt {
                table,
                message: e.to_string(),
            }
        })
    }

    async fn write_table(&self, table: Table, records: Vec<Record>) -> Result<(), RecordStoreError> {
        let io = |e: std::io::Error| RecordStoreError::Io {
            table,
            message: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;

        let body = serde_json::to_vec_pretty(&records).map_err(|e| RecordStoreError::Io {
            table,
            message: e.to_string(),
        })?;

        let path = self.path(table);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io)?;

        tracing::trace!(%table, records = records.len(), "Table file replaced");
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn load(
        &self,
        table: Table,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, RecordStoreError>> + Send + '_>> {
        Box::pin(self.read_table(table))
    }

    fn save(
        &self,
        table: Table,
        records: Vec<Record>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RecordStoreError>> + Send + '_>> {
        Box::pin(self.write_table(table, records))
    }
}
