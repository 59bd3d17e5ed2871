//! Vault session lifecycle for `dashvault`.
//!
//! [`VaultManager`] is the only way dashboard panels reach their API tokens.
//! It moves between three states:
//!
//! 1. **`NoVault`**: nothing valid is persisted.
//! 2. **`Locked`**: an encrypted payload is persisted, no plaintext in memory.
//! 3. **`Unlocked`**: the token map and the password are held in memory so
//!    token writes can re-seal the vault without prompting again.
//!
//! `clear_vault` returns to `NoVault` from any state.
//!
//! # Concurrency
//!
//! Every state-changing operation holds one async mutex for its whole
//! read-modify-write, including the storage write, so two overlapping token
//! writes can never drop each other's update. Session data sits behind a
//! separate `RwLock` that is write-locked only to commit a finished change,
//! so [`VaultManager::get_token`] never waits on key derivation. Key
//! derivation and AEAD run on the blocking thread pool.
//!
//! # Persistence
//!
//! The whole token map is re-encrypted under a fresh salt and nonce on every
//! change. In-memory state is updated only after the storage write returned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashvault_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::VaultConfig;
use crate::crypto::{self, EncryptedPayload, PAYLOAD_VERSION};
use crate::error::{CryptoError, VaultError};

/// Service identifier → bearer token.
pub type VaultTokens = HashMap<String, String>;

/// Coarse lifecycle state of a vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    /// No valid payload is persisted.
    NoVault,
    /// A payload is persisted but the session holds no plaintext.
    Locked,
    /// Tokens and password are held in memory.
    Unlocked,
}

/// Snapshot of a session, safe to hand to UI code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStatus {
    /// Current lifecycle state.
    pub state: VaultState,
    /// Whether a persisted payload exists.
    pub has_vault: bool,
    /// Whether plaintext tokens are available.
    pub unlocked: bool,
    /// Number of configured services (zero while locked).
    pub services: usize,
}

/// Plaintext held while unlocked. Zeroized on drop.
struct Unlocked {
    tokens: VaultTokens,
    password: Zeroizing<String>,
}

impl Unlocked {
    fn new(password: &str, tokens: VaultTokens) -> Self {
        Self {
            tokens,
            password: Zeroizing::new(password.to_owned()),
        }
    }
}

impl Drop for Unlocked {
    fn drop(&mut self) {
        for token in self.tokens.values_mut() {
            token.zeroize();
        }
    }
}

#[derive(Default)]
struct Session {
    /// Mirror of the last payload known to be in storage.
    encrypted: Option<EncryptedPayload>,
    unlocked: Option<Unlocked>,
}

impl Session {
    fn state(&self) -> VaultState {
        match (&self.encrypted, &self.unlocked) {
            (_, Some(_)) => VaultState::Unlocked,
            (Some(_), None) => VaultState::Locked,
            (None, None) => VaultState::NoVault,
        }
    }
}

/// Owns one vault session: the persisted payload mirror, and the plaintext
/// tokens while unlocked.
///
/// Construct once per session with [`VaultManager::load`] and share it as
/// `Arc<VaultManager>`; every method takes `&self`.
pub struct VaultManager {
    storage: Arc<dyn StorageBackend>,
    config: VaultConfig,
    session: RwLock<Session>,
    /// Serializes every state-changing operation.
    op_lock: Mutex<()>,
}

impl VaultManager {
    /// Start a session from whatever is persisted under the configured key.
    ///
    /// The session starts `Locked` if a valid version-1 payload is stored
    /// and `NoVault` otherwise. Unparseable or foreign values are logged and
    /// treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the storage backend fails.
    pub async fn load(
        storage: Arc<dyn StorageBackend>,
        config: VaultConfig,
    ) -> Result<Self, VaultError> {
        let encrypted = read_payload(storage.as_ref(), &config.storage_key).await?;
        debug!(
            key = %config.storage_key,
            has_vault = encrypted.is_some(),
            "vault session loaded"
        );
        Ok(Self {
            storage,
            config,
            session: RwLock::new(Session {
                encrypted,
                unlocked: None,
            }),
            op_lock: Mutex::new(()),
        })
    }

    /// Whether a persisted payload exists.
    pub async fn has_vault(&self) -> bool {
        self.session.read().await.encrypted.is_some()
    }

    /// Whether plaintext tokens are currently available.
    pub async fn is_unlocked(&self) -> bool {
        self.session.read().await.unlocked.is_some()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> VaultState {
        self.session.read().await.state()
    }

    /// Snapshot of the session for status displays. Never contains secrets.
    pub async fn status(&self) -> VaultStatus {
        let session = self.session.read().await;
        VaultStatus {
            state: session.state(),
            has_vault: session.encrypted.is_some(),
            unlocked: session.unlocked.is_some(),
            services: session.unlocked.as_ref().map_or(0, |u| u.tokens.len()),
        }
    }

    /// Sorted service identifiers with a stored token. Empty while locked.
    pub async fn service_ids(&self) -> Vec<String> {
        let session = self.session.read().await;
        let mut ids: Vec<String> = session
            .unlocked
            .as_ref()
            .map(|u| u.tokens.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Read the token for `service_id`.
    ///
    /// Returns `None` when locked, when no vault exists, or when the service
    /// has no token. Callers should treat `None` as "not configured" and
    /// degrade gracefully.
    pub async fn get_token(&self, service_id: &str) -> Option<String> {
        let session = self.session.read().await;
        session.unlocked.as_ref()?.tokens.get(service_id).cloned()
    }

    /// Create a new vault holding `initial_tokens`, sealed under `password`,
    /// and leave the session unlocked.
    ///
    /// Overwrites any existing persisted vault. Callers must confirm the
    /// user intends to replace it.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Crypto`] if encryption is unavailable.
    /// - [`VaultError::Storage`] if the payload cannot be written. The session
    ///   is left unchanged in that case.
    pub async fn initialize_vault(
        &self,
        password: &str,
        initial_tokens: VaultTokens,
    ) -> Result<(), VaultError> {
        let _op = self.op_lock.lock().await;

        let replaced = self.session.read().await.encrypted.is_some();
        let services = initial_tokens.len();
        self.seal_and_commit(Unlocked::new(password, initial_tokens))
            .await?;

        info!(services, replaced, "vault initialized");
        Ok(())
    }

    /// Re-seal the tokens held in memory under a new password and leave the
    /// session unlocked.
    ///
    /// Used both for first-time setup and for password changes. When the
    /// session is not unlocked, an empty token map is sealed, which replaces
    /// any locked vault.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Crypto`] if encryption is unavailable.
    /// - [`VaultError::Storage`] if the payload cannot be written.
    pub async fn set_master_password(&self, password: &str) -> Result<(), VaultError> {
        let _op = self.op_lock.lock().await;

        let (tokens, replaced_locked) = {
            let session = self.session.read().await;
            match &session.unlocked {
                Some(current) => (current.tokens.clone(), false),
                None => (VaultTokens::new(), session.encrypted.is_some()),
            }
        };
        if replaced_locked {
            warn!("setting master password on a locked vault; stored tokens are discarded");
        }

        let services = tokens.len();
        self.seal_and_commit(Unlocked::new(password, tokens)).await?;

        info!(services, "master password set");
        Ok(())
    }

    /// Try to unlock the persisted vault with `password`.
    ///
    /// Returns `Ok(true)` on success. Returns `Ok(false)` when the password
    /// is wrong or the payload is damaged, leaving the session as it was
    /// (an unlocked session stays unlocked). Also returns `Ok(false)` when
    /// no valid vault is persisted; the session then drops to `NoVault`.
    ///
    /// # Errors
    ///
    /// Only environment failures are errors:
    /// - [`VaultError::Storage`] if the storage backend fails.
    /// - [`VaultError::Crypto`] with [`CryptoError::Unavailable`].
    /// - [`VaultError::Worker`] if the crypto task did not complete.
    pub async fn unlock(&self, password: &str) -> Result<bool, VaultError> {
        let _op = self.op_lock.lock().await;

        let Some(payload) = read_payload(self.storage.as_ref(), &self.config.storage_key).await?
        else {
            // Storage is the source of truth: an unlocked session whose
            // payload vanished must not re-create it on the next write.
            let mut session = self.session.write().await;
            session.encrypted = None;
            if session.unlocked.take().is_some() {
                warn!("persisted vault disappeared; dropping unlocked session");
            }
            debug!("unlock attempted with no persisted vault");
            return Ok(false);
        };

        let params = self.config.kdf;
        let password = Zeroizing::new(password.to_owned());
        let sealed = payload.clone();
        let opened = tokio::task::spawn_blocking(move || {
            crypto::decrypt_data::<VaultTokens>(&password, &sealed, &params)
                .map(|tokens| Unlocked { tokens, password })
        })
        .await
        .map_err(worker_err)?;

        match opened {
            Ok(unlocked) => {
                let services = unlocked.tokens.len();
                let mut session = self.session.write().await;
                session.encrypted = Some(payload);
                session.unlocked = Some(unlocked);
                info!(services, "vault unlocked");
                Ok(true)
            }
            Err(
                CryptoError::InvalidPasswordOrCorruptedData | CryptoError::UnsupportedVersion { .. },
            ) => {
                self.session.write().await.encrypted = Some(payload);
                warn!("vault unlock failed: invalid password or corrupted data");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the plaintext tokens and password from memory. The persisted
    /// payload is untouched. No-op when already locked.
    pub async fn lock(&self) {
        let _op = self.op_lock.lock().await;

        if self.session.write().await.unlocked.take().is_some() {
            info!("vault locked");
        }
    }

    /// Store or replace the token for `service_id` and persist the re-sealed
    /// vault.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] if the session is not unlocked. Storage is not
    ///   touched.
    /// - [`VaultError::Crypto`] / [`VaultError::Storage`] on environment
    ///   failures, leaving the in-memory map unchanged.
    pub async fn set_service_token(&self, service_id: &str, token: &str) -> Result<(), VaultError> {
        let _op = self.op_lock.lock().await;

        let next = {
            let session = self.session.read().await;
            let current = session.unlocked.as_ref().ok_or(VaultError::Locked)?;
            let mut tokens = current.tokens.clone();
            tokens.insert(service_id.to_owned(), token.to_owned());
            Unlocked {
                tokens,
                password: current.password.clone(),
            }
        };
        self.seal_and_commit(next).await?;

        info!(service = service_id, "service token stored");
        Ok(())
    }

    /// Remove the token for `service_id` and persist the re-sealed vault.
    ///
    /// Removing a service that has no token succeeds without re-encrypting
    /// or writing anything.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Locked`] if the session is not unlocked.
    /// - [`VaultError::Crypto`] / [`VaultError::Storage`] on environment
    ///   failures.
    pub async fn clear_service_token(&self, service_id: &str) -> Result<(), VaultError> {
        let _op = self.op_lock.lock().await;

        let next = {
            let session = self.session.read().await;
            let current = session.unlocked.as_ref().ok_or(VaultError::Locked)?;
            if !current.tokens.contains_key(service_id) {
                debug!(service = service_id, "no token to clear");
                return Ok(());
            }
            let mut tokens = current.tokens.clone();
            if let Some(mut removed) = tokens.remove(service_id) {
                removed.zeroize();
            }
            Unlocked {
                tokens,
                password: current.password.clone(),
            }
        };
        self.seal_and_commit(next).await?;

        info!(service = service_id, "service token removed");
        Ok(())
    }

    /// Delete the persisted vault and all in-memory state.
    ///
    /// Irreversible. This is the only way forward after a forgotten password.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the delete fails; the session is
    /// left unchanged in that case.
    pub async fn clear_vault(&self) -> Result<(), VaultError> {
        let _op = self.op_lock.lock().await;

        self.storage.delete(&self.config.storage_key).await?;

        let mut session = self.session.write().await;
        session.encrypted = None;
        session.unlocked = None;

        warn!(key = %self.config.storage_key, "vault wiped");
        Ok(())
    }

    /// Encrypt `next`, persist it, then make it the session state.
    ///
    /// Must be called with `op_lock` held.
    async fn seal_and_commit(&self, next: Unlocked) -> Result<(), VaultError> {
        let params = self.config.kdf;
        let (payload, next) = tokio::task::spawn_blocking(move || -> Result<_, VaultError> {
            let payload = crypto::encrypt_data(next.password.as_str(), &next.tokens, &params)?;
            Ok((payload, next))
        })
        .await
        .map_err(worker_err)??;

        let bytes = serde_json::to_vec(&payload).map_err(|e| CryptoError::Serialization {
            reason: e.to_string(),
        })?;
        self.storage.put(&self.config.storage_key, &bytes).await?;

        let mut session = self.session.write().await;
        session.encrypted = Some(payload);
        session.unlocked = Some(next);
        Ok(())
    }
}

impl fmt::Debug for VaultManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultManager")
            .field("storage_key", &self.config.storage_key)
            .field("kdf", &self.config.kdf)
            .finish_non_exhaustive()
    }
}

/// Read and validate the persisted payload. Anything that is not a
/// well-formed version-1 payload counts as "no vault".
async fn read_payload(
    storage: &dyn StorageBackend,
    key: &str,
) -> Result<Option<EncryptedPayload>, VaultError> {
    let Some(bytes) = storage.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_slice::<EncryptedPayload>(&bytes) {
        Ok(payload) if payload.version == PAYLOAD_VERSION => Ok(Some(payload)),
        Ok(payload) => {
            warn!(key, version = payload.version, "ignoring persisted vault with unsupported version");
            Ok(None)
        }
        Err(e) => {
            warn!(key, error = %e, "ignoring unreadable persisted vault");
            Ok(None)
        }
    }
}

fn worker_err(e: tokio::task::JoinError) -> VaultError {
    VaultError::Worker {
        reason: e.to_string(),
    }
}
