//! Ed25519 keypair generation and detached sign/verify.
//!
//! This is the single place in the crate that touches raw key material
//! outside of encrypted storage. Callers should prefer [`keystore`](crate::keystore)
//! for anything that needs to persist a key.

use crate::error::LicenseError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use getrandom::fill;
use zeroize::Zeroize;

/// Generates a fresh Ed25519 keypair from the platform's cryptographic RNG.
///
/// The temporary 32-byte seed is zeroed immediately after deriving the keypair.
///
/// # Errors
/// Returns [`LicenseError::Internal`] if the system RNG is unavailable.
pub fn generate_keypair() -> Result<(SigningKey, VerifyingKey), LicenseError> {
    let mut seed = [0u8; 32];
    fill(&mut seed).map_err(|e| LicenseError::Internal {
        message: e.to_string().into(),
        context: Some("Generating Ed25519 seed".into()),
    })?;

    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    seed.zeroize();

    Ok((signing_key, verifying_key))
}

/// Generates a cryptographically strong 32-byte secret (salts, symmetric IKM, etc).
///
/// # Errors
/// Returns [`LicenseError::Internal`] if the system RNG is unavailable.
pub fn generate_secret() -> Result<[u8; 32], LicenseError> {
    let mut secret = [0u8; 32];
    fill(&mut secret).map_err(|e| LicenseError::Internal {
        message: e.to_string().into(),
        context: Some("Generating secret".into()),
    })?;
    Ok(secret)
}

/// Signs `message` with the given raw 32-byte Ed25519 secret.
pub fn sign(secret: &[u8; 32], message: &[u8]) -> Signature {
    SigningKey::from_bytes(secret).sign(message)
}

/// Verifies a detached signature against a raw 32-byte Ed25519 public key.
///
/// # Errors
/// Returns [`LicenseError::BadSignature`] if the public key bytes are malformed
/// or the signature does not verify.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), LicenseError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|source| LicenseError::BadSignature {
            source,
            context: Some("Parsing public key".into()),
        })?;
    let signature =
        Signature::from_slice(signature).map_err(|source| LicenseError::BadSignature {
            source,
            context: Some("Parsing signature bytes".into()),
        })?;

    verifying_key
        .verify(message, &signature)
        .map_err(|source| LicenseError::BadSignature { source, context: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let (signing, verifying) = generate_keypair().expect("keypair");
        let message = b"musterhub licensing";
        let signature = signing.sign(message);

        verify(&verifying.to_bytes(), message, &signature.to_bytes()).expect("verifies");
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let (signing, verifying) = generate_keypair().expect("keypair");
        let signature = signing.sign(b"original");

        let err = verify(&verifying.to_bytes(), b"tampered", &signature.to_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn generated_secrets_are_not_trivially_repeated() {
        let a = generate_secret().expect("secret a");
        let b = generate_secret().expect("secret b");
        assert_ne!(a, b);
    }
}
