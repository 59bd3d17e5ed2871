//! Durable redb storage backend.
//!
//! redb is a pure-Rust embedded B-tree store with ACID transactions, so a
//! `put` that has returned is on disk. Feature-gated behind `redb-backend`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, TableDefinition};
use tracing::debug;

use crate::{StorageBackend, StorageError};

/// The single table holding every key. Namespacing lives in the keys.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("data");

/// A storage backend backed by a redb database file.
///
/// Thread-safe via `Arc<Database>`. Blocking redb calls are offloaded to the
/// Tokio blocking thread pool.
///
/// # Examples
///
/// ```no_run
/// # use dashvault_storage::RedbBackend;
/// let backend = RedbBackend::open("/home/me/.local/share/dashvault/vault.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or created,
    /// or [`StorageError::Transaction`] if the data table cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Opening the table inside a write transaction creates it if missing,
        // so later read transactions never hit a missing table.
        let txn = db.begin_write().map_err(transaction_err)?;
        txn.open_table(DATA_TABLE).map_err(missing_table_err)?;
        txn.commit().map_err(transaction_err)?;

        debug!(path = %path.display(), "opened redb storage");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    fn write<F>(&self, key: &str, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>, &str) -> Result<(), StorageError>,
    {
        let txn = self.db.begin_write().map_err(transaction_err)?;
        {
            let mut table = txn.open_table(DATA_TABLE).map_err(missing_table_err)?;
            apply(&mut table, key)?;
        }
        txn.commit().map_err(transaction_err)
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        let err_key = key.clone();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(transaction_err)?;
            let table = txn.open_table(DATA_TABLE).map_err(missing_table_err)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
        .map_err(|e| StorageError::Read {
            key: err_key,
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let backend = self.clone();
        let key = key.to_owned();
        let err_key = key.clone();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || {
            backend.write(&key, |table, key| {
                table
                    .insert(key, value.as_slice())
                    .map(|_| ())
                    .map_err(|e| StorageError::Write {
                        key: key.to_owned(),
                        reason: e.to_string(),
                    })
            })
        })
        .await
        .map_err(|e| StorageError::Write {
            key: err_key,
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let backend = self.clone();
        let key = key.to_owned();
        let err_key = key.clone();
        tokio::task::spawn_blocking(move || {
            backend.write(&key, |table, key| {
                // remove() returns Ok(None) for a missing key.
                table
                    .remove(key)
                    .map(|_| ())
                    .map_err(|e| StorageError::Delete {
                        key: key.to_owned(),
                        reason: e.to_string(),
                    })
            })
        })
        .await
        .map_err(|e| StorageError::Delete {
            key: err_key,
            reason: format!("blocking task panicked: {e}"),
        })?
    }
}

fn transaction_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn missing_table_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::MissingTable {
        name: format!("data: {e}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("vault.redb")).unwrap();

        assert_eq!(backend.get("dashboard.vault").await.unwrap(), None);
        backend.put("dashboard.vault", b"payload").await.unwrap();
        assert_eq!(
            backend.get("dashboard.vault").await.unwrap(),
            Some(b"payload".to_vec())
        );

        backend.delete("dashboard.vault").await.unwrap();
        assert_eq!(backend.get("dashboard.vault").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_missing_key_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("vault.redb")).unwrap();
        backend.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.redb");

        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put("dashboard.vault", b"v1").await.unwrap();
            backend.put("dashboard.vault", b"v2").await.unwrap();
        }

        let reopened = RedbBackend::open(&path).unwrap();
        assert_eq!(
            reopened.get("dashboard.vault").await.unwrap(),
            Some(b"v2".to_vec())
        );
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = RedbBackend::open(dir.path().join("no/such/dir/vault.redb"));
        assert!(matches!(result, Err(StorageError::Open { .. })));
    }
}
