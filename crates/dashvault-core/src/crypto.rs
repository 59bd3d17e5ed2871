//! Crypto engine for `dashvault`.
//!
//! Seals any serde-serializable value under a password and opens it again.
//! Every call is self-contained: it takes the password, the data or payload,
//! and the KDF parameters, and touches no other state.
//!
//! # Security model
//!
//! - Keys come from PBKDF2-HMAC-SHA256 (200,000 iterations by default) over
//!   a fresh 16-byte salt per encryption.
//! - Values are sealed with AES-256-GCM under a fresh 12-byte nonce. A new
//!   salt means a new key on every save, so a nonce is never reused under
//!   the same key.
//! - Decryption failures are reported as one opaque error. Wrong password,
//!   bit rot and tampering all look the same to the caller.
//! - Derived keys and decrypted plaintext are zeroized on drop.

use std::fmt;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// The only payload format version this build reads or writes.
pub const PAYLOAD_VERSION: u32 = 1;

/// Salt length for key derivation (128 bits).
pub const SALT_LEN: usize = 16;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 200_000;

/// Key derivation parameters.
///
/// The iteration count is not stored in the payload, so every reader of a
/// vault must use the same parameters as its writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// PBKDF2-HMAC-SHA256 iteration count.
    pub iterations: u32,
}

impl KdfParams {
    /// Build parameters with an explicit iteration count.
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_ITERATIONS)
    }
}

/// A password-derived AES-256-GCM key.
///
/// The bytes never leave this module: there is no accessor, the key cannot
/// be cloned, and `Debug` redacts it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The persisted, encrypted form of the vault.
///
/// Serializes to `{"version":1,"salt":"…","iv":"…","ciphertext":"…"}` with
/// standard base64 for the binary fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Format version, always [`PAYLOAD_VERSION`] when written by this build.
    pub version: u32,
    /// Base64 KDF salt.
    pub salt: String,
    /// Base64 AES-GCM nonce.
    pub iv: String,
    /// Base64 ciphertext with the 16-byte tag appended.
    pub ciphertext: String,
}

/// Derive a 256-bit key from a password and salt.
///
/// Deterministic for a given `(password, salt, params)`. Empty passwords
/// are accepted here.
#[must_use]
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN], params: &KdfParams) -> EncryptionKey {
    let mut key = EncryptionKey([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key.0);
    key
}

/// Serialize `data` and seal it under `password`.
///
/// A fresh salt and nonce are drawn for every call, so encrypting the same
/// data twice never produces the same payload.
///
/// # Errors
///
/// - [`CryptoError::Unavailable`] if the OS random source or the cipher fails.
/// - [`CryptoError::Serialization`] if `data` cannot be serialized to JSON.
pub fn encrypt_data<T>(
    password: &str,
    data: &T,
    params: &KdfParams,
) -> Result<EncryptedPayload, CryptoError>
where
    T: Serialize + ?Sized,
{
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    let mut iv = [0u8; NONCE_LEN];
    fill_random(&mut iv)?;

    let plaintext = Zeroizing::new(serde_json::to_vec(data).map_err(|e| {
        CryptoError::Serialization {
            reason: e.to_string(),
        }
    })?);

    let key = derive_key(password, &salt, params);
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|e| CryptoError::Unavailable {
            reason: format!("AES-256-GCM encryption failed: {e}"),
        })?;

    Ok(EncryptedPayload {
        version: PAYLOAD_VERSION,
        salt: BASE64.encode(salt),
        iv: BASE64.encode(iv),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Open a payload produced by [`encrypt_data`] and deserialize its contents.
///
/// # Errors
///
/// - [`CryptoError::UnsupportedVersion`] if `payload.version` is not
///   [`PAYLOAD_VERSION`]. Checked before any decoding or key derivation.
/// - [`CryptoError::InvalidPasswordOrCorruptedData`] for every other
///   failure: bad base64, wrong field lengths, authentication failure, or
///   plaintext that does not deserialize as `T`.
pub fn decrypt_data<T>(
    password: &str,
    payload: &EncryptedPayload,
    params: &KdfParams,
) -> Result<T, CryptoError>
where
    T: DeserializeOwned,
{
    if payload.version != PAYLOAD_VERSION {
        return Err(CryptoError::UnsupportedVersion {
            found: payload.version,
        });
    }

    let salt: [u8; SALT_LEN] = decode_fixed(&payload.salt)?;
    let iv: [u8; NONCE_LEN] = decode_fixed(&payload.iv)?;
    let ciphertext = BASE64
        .decode(&payload.ciphertext)
        .map_err(|_| CryptoError::InvalidPasswordOrCorruptedData)?;

    let key = derive_key(password, &salt, params);
    let plaintext = Zeroizing::new(
        key.cipher()
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| CryptoError::InvalidPasswordOrCorruptedData)?,
    );

    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::InvalidPasswordOrCorruptedData)
}

fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Unavailable {
            reason: format!("OS random source failed: {e}"),
        })
}

fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N], CryptoError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidPasswordOrCorruptedData)?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidPasswordOrCorruptedData)
}
