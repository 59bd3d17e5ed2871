//! Error types for `dashvault-core`.
//!
//! Crypto errors never carry key material, passwords, or plaintext. The
//! decryption failure variant carries nothing at all so callers cannot tell
//! a wrong password from damaged data.

use dashvault_storage::StorageError;

/// Errors from the crypto engine.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The OS random source or the cipher is not usable in this environment.
    #[error("crypto primitives unavailable: {reason}")]
    Unavailable { reason: String },

    /// The payload declares a format version this build does not understand.
    #[error("unsupported vault payload version {found}")]
    UnsupportedVersion { found: u32 },

    /// Decryption or deserialization failed (wrong password, corrupted or
    /// tampered payload).
    #[error("invalid password or corrupted data")]
    InvalidPasswordOrCorruptedData,

    /// The plaintext could not be serialized before encryption.
    #[error("failed to serialize vault data: {reason}")]
    Serialization { reason: String },
}

/// Errors from the vault manager.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A token write or removal was attempted without an unlocked session.
    #[error("vault is locked")]
    Locked,

    /// A crypto engine operation failed.
    #[error("vault crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The storage backend returned an error.
    #[error("vault storage error: {0}")]
    Storage(#[from] StorageError),

    /// The blocking crypto worker did not complete.
    #[error("vault crypto worker failed: {reason}")]
    Worker { reason: String },
}
