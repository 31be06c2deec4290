//! License key formatting, salted hashing, and recovery-copy encryption.
//!
//! Keys are human-facing activation strings; only their salted hash is ever
//! persisted unencrypted. An optional AEAD-encrypted copy of the plaintext
//! is kept for support/recovery flows.

use crate::error::{LicenseError, LicenseErrorExt};
use getrandom::fill;
use mhub_vault::prelude::*;
use sha2::{Digest, Sha256};

const GROUP_COUNT: usize = 4;
const GROUP_LEN: usize = 4;
const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// The largest multiple of `ALPHABET.len()` that fits in a byte. Bytes at or
/// above this are discarded by [`alphabet_index`] rather than reduced with
/// `%`, since `256 % 36 != 0` would otherwise bias the low end of the
/// alphabet toward a slightly higher draw probability.
const REJECTION_THRESHOLD: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Draws one uniformly random index into [`ALPHABET`] via rejection
/// sampling, pulling fresh bytes from the CSPRNG as needed.
fn alphabet_index() -> Result<usize, LicenseError> {
    loop {
        let mut byte = [0u8; 1];
        fill(&mut byte).map_err(|e| LicenseError::Internal {
            message: e.to_string().into(),
            context: Some("Generating license key entropy".into()),
        })?;

        if byte[0] < REJECTION_THRESHOLD {
            return Ok(usize::from(byte[0]) % ALPHABET.len());
        }
    }
}

/// Generates a formatted license key: `PREFIX-G1-G2-G3-G4`, each group 4
/// uppercase alphanumerics drawn uniformly from the platform CSPRNG via
/// rejection sampling. At 36 symbols per character and 16 characters of
/// entropy, this comfortably clears the 80-bit minimum
/// (log2(36^16) ≈ 82.7 bits).
///
/// # Errors
/// Returns [`LicenseError::Internal`] if the system RNG is unavailable.
pub fn generate(prefix: &str) -> Result<String, LicenseError> {
    let mut key = String::with_capacity(prefix.len() + 1 + GROUP_COUNT * (GROUP_LEN + 1));
    key.push_str(prefix);

    for _ in 0..GROUP_COUNT {
        key.push('-');
        for _ in 0..GROUP_LEN {
            key.push(ALPHABET[alphabet_index()?] as char);
        }
    }

    Ok(key)
}

/// Computes `SHA-256(salt ‖ key)`.
///
/// `salt` is a process-wide secret derived from configured key material, not
/// a per-key value — this hash exists to let the store verify a presented
/// key without ever persisting the plaintext.
#[must_use]
pub fn hash(salt: &[u8], key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Verifies `key` against a previously computed `stored_hash`, in constant time.
#[must_use]
pub fn verify(salt: &[u8], key: &str, stored_hash: &[u8; 32]) -> bool {
    let computed = hash(salt, key);
    constant_time_eq(&computed, stored_hash)
}

/// Fixed-time byte comparison. Always walks the full length of `a` so that
/// timing does not leak the position of the first mismatching byte.
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Encrypts `key` for recovery storage using the process-wide recovery vault.
///
/// # Errors
/// Returns [`LicenseError::Vault`] if the underlying AEAD seal fails.
pub fn encrypt_for_recovery(vault: &Vault<Aes>, key: &str) -> Result<Vec<u8>, LicenseError> {
    let sealed = vault
        .seal_bytes::<Local>(key.as_bytes(), b"license-key-recovery")
        .context("Sealing recovery copy")?;
    Ok(sealed.as_slice().to_vec())
}

/// Decrypts a recovery copy produced by [`encrypt_for_recovery`].
///
/// # Errors
/// Returns [`LicenseError::Vault`] if decryption fails, or [`LicenseError::Internal`]
/// if the plaintext is not valid UTF-8.
pub fn decrypt_recovery(vault: &Vault<Aes>, ciphertext: &[u8]) -> Result<String, LicenseError> {
    let plaintext = vault
        .unseal_bytes::<Local>(ciphertext, b"license-key-recovery")
        .context("Unsealing recovery copy")?;
    String::from_utf8(plaintext).map_err(|e| LicenseError::Internal {
        message: e.to_string().into(),
        context: Some("Recovery copy was not valid UTF-8".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_match_the_grouped_format() {
        let key = generate("MHUB").expect("key generates");
        let groups: Vec<&str> = key.split('-').collect();
        assert_eq!(groups.len(), GROUP_COUNT + 1);
        assert_eq!(groups[0], "MHUB");
        for group in &groups[1..] {
            assert_eq!(group.len(), GROUP_LEN);
            assert!(group.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn verify_accepts_the_same_key_and_rejects_others() {
        let salt = b"process-wide-salt";
        let key = generate("MHUB").expect("key generates");
        let other = generate("MHUB").expect("key generates");

        let stored = hash(salt, &key);
        assert!(verify(salt, &key, &stored));
        assert!(!verify(salt, &other, &stored));
    }

    #[test]
    fn recovery_round_trips() {
        let vault =
            Vault::<Aes>::builder().derived_keys("ikm", "salt", "node-1").unwrap().build().unwrap();
        let key = generate("MHUB").expect("key generates");

        let sealed = encrypt_for_recovery(&vault, &key).expect("seals");
        let recovered = decrypt_recovery(&vault, &sealed).expect("unseals");
        assert_eq!(recovered, key);
    }
}
