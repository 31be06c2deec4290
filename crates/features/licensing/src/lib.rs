//! # Licensing authority
//!
//! A software licensing and verification service: license lifecycle and
//! seat accounting, a two-tier Ed25519 key hierarchy (root CA + scoped
//! signing keys), offline-verifiable signed tokens patterned after PASETO
//! v4 public, and a hash-chained audit trail via [`mhub_audit`].
//!
//! Module map:
//! - [`crypto`] — Ed25519 keypair generation, detached sign/verify.
//! - [`codec`] — license key formatting, salted hashing, recovery encryption.
//! - [`keystore`] — key persistence, passphrase-gated private-key encryption.
//! - [`ca`] — certificate issuance and verification (signing key → root).
//! - [`license`] — license entity, state machine, policy resolution.
//! - [`usage`] — concurrency-safe seat registrar.
//! - [`token`] — offline token issuance/verification/refresh.
//! - [`scope`] — scope metadata and scoped key rotation.
//! - [`sweep`] — expiration, inactivity, and rotation sweeps.
//! - [`bundle`] — public-key bundle export for client-side offline verification.

pub mod bundle;
pub mod ca;
pub mod codec;
pub mod crypto;
mod error;
pub mod keystore;
pub mod license;
mod lock;
pub mod scope;
#[cfg(feature = "server")]
pub mod sweep;
pub mod token;
pub mod usage;

pub use crate::error::{LicenseError, LicenseErrorExt};
pub use crate::keystore::PassphraseCache;

#[cfg(feature = "server")]
use mhub_domain::config::ApiConfig;
#[cfg(feature = "server")]
use mhub_kernel::domain::registry::InitializedSlice;

/// Licensing feature state: holds the process-local private-key passphrase
/// cache shared by every handler that needs to sign with a stored key.
#[mhub_derive::mhub_slice]
pub struct Licensing {
    pub cache: PassphraseCache,
}

/// Initializes the licensing slice, seeding the passphrase cache from the
/// configured environment binding (`LicensingConfig::passphrase_env`) when
/// it is present.
///
/// # Errors
/// This never fails today; it returns a `Result` to match the other slices
/// and to leave room for future startup validation (e.g. refusing to start
/// without an Active root in a strict deployment mode).
#[cfg(feature = "server")]
pub fn init(config: &ApiConfig) -> Result<InitializedSlice, LicenseError> {
    let cache = PassphraseCache::new();

    match std::env::var(&config.licensing.passphrase_env) {
        Ok(passphrase) if !passphrase.is_empty() => {
            cache.set(passphrase);
            tracing::info!("licensing keystore passphrase loaded from environment");
        }
        _ => {
            tracing::warn!(
                var = %config.licensing.passphrase_env,
                "licensing keystore passphrase not set; private-key operations will fail until it is"
            );
        }
    }

    let slice = Licensing::new(LicensingInner { cache });
    tracing::info!("Licensing slice initialized");
    Ok(InitializedSlice::new(slice))
}

/// Serde helper: `Vec<u8>` as standard Base64 (padded).
pub mod bytes_as_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Serde helper: `[u8; 32]` as standard Base64 (padded).
pub mod bytes_as_base64_fixed {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)?;
        <[u8; 32]>::try_from(decoded.as_slice())
            .map_err(|_| serde::de::Error::custom("expected 32 decoded bytes"))
    }
}
