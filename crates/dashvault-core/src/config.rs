//! Vault configuration.
//!
//! Loads from environment variables with sensible defaults. All settings can
//! be overridden via `DASHVAULT_*` environment variables.

use tracing::warn;

use crate::crypto::{DEFAULT_KDF_ITERATIONS, KdfParams};

/// Default storage key for the persisted payload.
pub const DEFAULT_STORAGE_KEY: &str = "dashboard.vault";

/// Iteration counts below this are refused. Raising the work factor is
/// allowed; lowering it is not.
pub const MIN_KDF_ITERATIONS: u32 = DEFAULT_KDF_ITERATIONS;

/// Vault configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Namespaced storage key under which the encrypted payload lives.
    pub storage_key: String,
    /// Key derivation parameters used for every encrypt and decrypt.
    pub kdf: KdfParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            kdf: KdfParams::default(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DASHVAULT_STORAGE_KEY` — storage key (default: `dashboard.vault`)
    /// - `DASHVAULT_KDF_ITERATIONS` — PBKDF2 iterations (default and minimum:
    ///   `200000`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("DASHVAULT_STORAGE_KEY").ok(),
            std::env::var("DASHVAULT_KDF_ITERATIONS").ok(),
        )
    }

    fn from_vars(storage_key: Option<String>, iterations: Option<String>) -> Self {
        let storage_key = storage_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_owned());

        let iterations = match iterations {
            None => DEFAULT_KDF_ITERATIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= MIN_KDF_ITERATIONS => n,
                _ => {
                    warn!(
                        value = %raw,
                        minimum = MIN_KDF_ITERATIONS,
                        "ignoring invalid DASHVAULT_KDF_ITERATIONS"
                    );
                    DEFAULT_KDF_ITERATIONS
                }
            },
        };

        Self {
            storage_key,
            kdf: KdfParams::new(iterations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = VaultConfig::from_vars(None, None);
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.storage_key, "dashboard.vault");
        assert_eq!(config.kdf.iterations, 200_000);
    }

    #[test]
    fn explicit_values_are_used() {
        let config =
            VaultConfig::from_vars(Some("panel.tokens".to_owned()), Some("600000".to_owned()));
        assert_eq!(config.storage_key, "panel.tokens");
        assert_eq!(config.kdf.iterations, 600_000);
    }

    #[test]
    fn iterations_below_floor_are_refused() {
        for raw in ["10", "1000", "199999"] {
            let config = VaultConfig::from_vars(None, Some(raw.to_owned()));
            assert_eq!(config.kdf.iterations, DEFAULT_KDF_ITERATIONS, "{raw}");
        }
        let config = VaultConfig::from_vars(None, Some("200000".to_owned()));
        assert_eq!(config.kdf.iterations, MIN_KDF_ITERATIONS);
    }

    #[test]
    fn unparseable_iterations_fall_back() {
        let config = VaultConfig::from_vars(None, Some("lots".to_owned()));
        assert_eq!(config.kdf.iterations, DEFAULT_KDF_ITERATIONS);
    }

    #[test]
    fn blank_storage_key_falls_back() {
        let config = VaultConfig::from_vars(Some("  ".to_owned()), None);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
    }
}
