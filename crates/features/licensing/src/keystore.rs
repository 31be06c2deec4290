//! Key persistence: root/signing keys, passphrase-gated private-key
//! encryption, and the scoped rotation policy.

use crate::ca::CertificateEnvelope;
use crate::crypto;
use crate::error::{LicenseError, LicenseErrorExt};
use chrono::{DateTime, Utc};
use mhub_database::Database;
use mhub_kernel::safe_nanoid;
use mhub_vault::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use zeroize::Zeroizing;

/// Kind of key stored in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Root,
    Signing,
}

/// Lifecycle status of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Revoked,
    Expired,
}

/// A persisted Ed25519 key (root or signing).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensingKey {
    pub kid: String,
    pub key_type: KeyType,
    pub status: KeyStatus,
    pub public_key: [u8; 32],
    /// AEAD ciphertext of the raw 32-byte Ed25519 secret, under the
    /// process passphrase-derived key.
    pub private_key_encrypted: Vec<u8>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub certificate: Option<CertificateEnvelope>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
}

impl LicensingKey {
    /// `Active` status and `valid_from ≤ instant < valid_until` (or perpetual).
    #[must_use]
    pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Active
            && self.valid_from <= instant
            && self.valid_until.is_none_or(|until| instant < until)
    }
}

/// Process-local cache of the key-store passphrase.
///
/// The passphrase is never persisted; callers must explicitly `set` it after
/// process start (e.g. from the `LICENSING_KEY_PASSPHRASE` environment
/// binding) and may `clear` it to force re-entry.
#[derive(Debug, Default)]
pub struct PassphraseCache {
    inner: Mutex<Option<Zeroizing<String>>>,
}

impl PassphraseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, passphrase: impl Into<String>) {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(Zeroizing::new(passphrase.into()));
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        let guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.as_ref().map(|p| p.as_str().to_owned())
    }
}

fn private_key_vault(passphrase: &str, kid: &str) -> Result<Vault<Aes>, LicenseError> {
    Vault::<Aes>::builder()
        .derived_keys(passphrase, "mhub-licensing-keystore", kid)
        .context("Deriving keystore vault")?
        .build()
        .context("Building keystore vault")
}

const PRIVATE_KEY_CONTEXT: &[u8] = b"licensing-key-private-half";

/// Encrypts a raw Ed25519 secret under the passphrase-derived key for `kid`.
///
/// # Errors
/// Returns [`LicenseError::KeystorePassphraseMissing`] if no passphrase is
/// cached, or [`LicenseError::Vault`] if sealing fails.
pub fn encrypt_private_key(
    cache: &PassphraseCache,
    kid: &str,
    secret: &[u8; 32],
) -> Result<Vec<u8>, LicenseError> {
    let passphrase = cache.get().ok_or_else(|| LicenseError::KeystorePassphraseMissing {
        message: "no passphrase set in the process-local cache".into(),
        context: Some(kid.to_owned().into()),
    })?;

    let vault = private_key_vault(&passphrase, kid)?;
    let sealed =
        vault.seal_bytes::<Local>(secret, PRIVATE_KEY_CONTEXT).context("Sealing private key")?;
    Ok(sealed.as_slice().to_vec())
}

/// Decrypts a private key previously sealed by [`encrypt_private_key`].
///
/// # Errors
/// Returns [`LicenseError::KeystorePassphraseMissing`] if no passphrase is
/// cached, or [`LicenseError::Vault`] if unsealing fails.
pub fn decrypt_private_key(
    cache: &PassphraseCache,
    kid: &str,
    ciphertext: &[u8],
) -> Result<[u8; 32], LicenseError> {
    let passphrase = cache.get().ok_or_else(|| LicenseError::KeystorePassphraseMissing {
        message: "no passphrase set in the process-local cache".into(),
        context: Some(kid.to_owned().into()),
    })?;

    let vault = private_key_vault(&passphrase, kid)?;
    let plaintext = vault
        .unseal_bytes::<Local>(ciphertext, PRIVATE_KEY_CONTEXT)
        .context("Unsealing private key")?;

    <[u8; 32]>::try_from(plaintext.as_slice()).map_err(|_| LicenseError::Internal {
        message: "decrypted private key had an unexpected length".into(),
        context: Some(kid.to_owned().into()),
    })
}

/// Creates a new key (root or signing), persisting it as `Active`.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure, or a crypto error
/// if key generation or encryption fails.
pub async fn create(
    db: &Database,
    cache: &PassphraseCache,
    key_type: KeyType,
    scope: Option<&str>,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
) -> Result<LicensingKey, LicenseError> {
    let (signing_key, verifying_key) = crypto::generate_keypair()?;
    let kid = format!("kid_{}", safe_nanoid!());
    let private_key_encrypted = encrypt_private_key(cache, &kid, &signing_key.to_bytes())?;

    let key = LicensingKey {
        kid: kid.clone(),
        key_type,
        status: KeyStatus::Active,
        public_key: verifying_key.to_bytes(),
        private_key_encrypted,
        valid_from,
        valid_until,
        scope: scope.map(str::to_owned),
        certificate: None,
        revoked_at: None,
        revoked_reason: None,
    };

    let _: Option<LicensingKey> = db
        .query("CREATE licensing_keys CONTENT $key")
        .bind(("key", key.clone()))
        .await
        .context("Persisting new key")?
        .take(0)
        .context("Parsing created key")?;

    tracing::info!(kid = %key.kid, ?key_type, "licensing key created");
    Ok(key)
}

/// Stores the certificate envelope issued for a signing key.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn attach_certificate(
    db: &Database,
    kid: &str,
    certificate: CertificateEnvelope,
) -> Result<(), LicenseError> {
    db.query("UPDATE licensing_keys SET certificate = $certificate WHERE kid = $kid")
        .bind(("kid", kid.to_owned()))
        .bind(("certificate", certificate))
        .await
        .context("Attaching certificate")?;
    Ok(())
}

/// Finds the single Active root key, if any.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_active_root(db: &Database) -> Result<Option<LicensingKey>, LicenseError> {
    db.query("SELECT * FROM licensing_keys WHERE key_type = 'root' AND status = 'active' LIMIT 1")
        .await
        .context("Querying active root key")?
        .take(0)
        .context("Parsing active root key")
}

/// Finds an Active signing key, preferring `scope` and falling back to the
/// global (unscoped) key when `scope` is `None` or no scoped match exists.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_active_signing(
    db: &Database,
    scope: Option<&str>,
) -> Result<Option<LicensingKey>, LicenseError> {
    if let Some(scope) = scope {
        let scoped: Option<LicensingKey> = db
            .query(
                "SELECT * FROM licensing_keys \
                 WHERE key_type = 'signing' AND status = 'active' AND scope = $scope \
                 ORDER BY valid_from DESC LIMIT 1",
            )
            .bind(("scope", scope.to_owned()))
            .await
            .context("Querying scoped signing key")?
            .take(0)
            .context("Parsing scoped signing key")?;

        if scoped.is_some() {
            return Ok(scoped);
        }
    }

    db.query(
        "SELECT * FROM licensing_keys \
         WHERE key_type = 'signing' AND status = 'active' AND scope = NONE \
         ORDER BY valid_from DESC LIMIT 1",
    )
    .await
    .context("Querying global signing key")?
    .take(0)
    .context("Parsing global signing key")
}

/// Looks up a key by `kid`, regardless of status.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_by_kid(db: &Database, kid: &str) -> Result<Option<LicensingKey>, LicenseError> {
    db.query("SELECT * FROM licensing_keys WHERE kid = $kid LIMIT 1")
        .bind(("kid", kid.to_owned()))
        .await
        .context("Querying key by kid")?
        .take(0)
        .context("Parsing key by kid")
}

/// Revokes a key, idempotently. A key already `Revoked` keeps its original
/// `revoked_at`/reason.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if `kid` does not exist, or
/// [`LicenseError::Database`] on storage failure.
pub async fn revoke(
    db: &Database,
    kid: &str,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<LicensingKey, LicenseError> {
    let existing = find_by_kid(db, kid).await?.ok_or_else(|| LicenseError::LicenseNotFound {
        message: format!("no key with kid {kid}").into(),
        context: Some("Revoking key".into()),
    })?;

    if existing.status == KeyStatus::Revoked {
        return Ok(existing);
    }

    db.query(
        "UPDATE licensing_keys SET status = 'revoked', revoked_at = $at, revoked_reason = $reason \
         WHERE kid = $kid",
    )
    .bind(("kid", kid.to_owned()))
    .bind(("reason", reason.to_owned()))
    .bind(("at", at))
    .await
    .context("Revoking key")?;

    Ok(LicensingKey {
        status: KeyStatus::Revoked,
        revoked_at: Some(at),
        revoked_reason: Some(reason.to_owned()),
        ..existing
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_cache_set_get_clear() {
        let cache = PassphraseCache::new();
        assert!(cache.get().is_none());

        cache.set("correct horse battery staple");
        assert_eq!(cache.get().as_deref(), Some("correct horse battery staple"));

        cache.clear();
        assert!(cache.get().is_none());
    }

    #[test]
    fn private_key_round_trips_through_the_vault() {
        let cache = PassphraseCache::new();
        cache.set("passphrase-under-test");

        let (signing_key, _) = crypto::generate_keypair().expect("keypair");
        let secret = signing_key.to_bytes();

        let sealed = encrypt_private_key(&cache, "kid_test", &secret).expect("seals");
        let recovered = decrypt_private_key(&cache, "kid_test", &sealed).expect("unseals");

        assert_eq!(secret, recovered);
    }

    #[test]
    fn missing_passphrase_is_reported() {
        let cache = PassphraseCache::new();
        let err = encrypt_private_key(&cache, "kid_test", &[0u8; 32]);
        assert!(matches!(err, Err(LicenseError::KeystorePassphraseMissing { .. })));
    }

    #[test]
    fn is_active_at_respects_the_validity_window() {
        let now = Utc::now();
        let key = LicensingKey {
            kid: "kid_test".into(),
            key_type: KeyType::Signing,
            status: KeyStatus::Active,
            public_key: [0u8; 32],
            private_key_encrypted: Vec::new(),
            valid_from: now - chrono::Duration::days(1),
            valid_until: Some(now + chrono::Duration::days(1)),
            scope: None,
            certificate: None,
            revoked_at: None,
            revoked_reason: None,
        };

        assert!(key.is_active_at(now));
        assert!(!key.is_active_at(now + chrono::Duration::days(2)));
    }
}
