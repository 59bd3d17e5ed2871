//! Core library for `dashvault`.
//!
//! Contains the crypto engine (PBKDF2 key derivation and AES-256-GCM
//! sealing of the token map) and the vault manager that owns the
//! lock/unlock session. Persistence goes through the `StorageBackend`
//! trait from `dashvault-storage`.

pub mod config;
pub mod crypto;
pub mod error;
pub mod vault;

pub use config::VaultConfig;
pub use crypto::{EncryptedPayload, KdfParams};
pub use error::{CryptoError, VaultError};
pub use vault::{VaultManager, VaultState, VaultStatus, VaultTokens};
