//! Storage backend abstraction for `dashvault`.
//!
//! This crate defines the [`StorageBackend`] trait — a plain key-value
//! persistence interface that knows nothing about passwords, tokens, or
//! encryption. The vault manager in `dashvault-core` only ever hands it an
//! already-encrypted payload.
//!
//! Two implementations are provided:
//!
//! - [`RedbBackend`] — durable default, backed by redb (feature `redb-backend`)
//! - [`MemoryBackend`] — in-memory, for tests and ephemeral sessions

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are namespaced UTF-8 strings (e.g. `dashboard.vault`). Values are
/// opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// The write is durable once the returned future resolves.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
