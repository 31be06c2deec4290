//! Certificate authority: canonical-JSON leaf certificates binding a signing
//! key's public half to the root that certified it.

use crate::crypto;
use crate::error::LicenseError;
use crate::keystore::{self, KeyStatus, KeyType, LicensingKey, PassphraseCache};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use mhub_database::Database;
use serde::{Deserialize, Serialize};

/// The canonical certificate document, before signing.
///
/// Field order below is the bit-exact contract: [`Certificate::canonical_json`]
/// writes these fields by hand, in this declared order, rather than deriving
/// from `serde_json::to_string` (whose field order is not contractually fixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub kid: String,
    pub public_key: [u8; 32],
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
    pub issuer_kid: String,
    pub scope: Option<String>,
    pub scope_identifier: Option<String>,
}

impl Certificate {
    /// Serializes the document in a fixed field order, with no extra
    /// whitespace, RFC 3339-with-offset timestamps, and Base64 (standard,
    /// padded) for the public key, so signer and verifier always agree
    /// byte-for-byte on what was signed.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let valid_until = self
            .valid_until
            .map_or_else(|| "null".to_owned(), |v| format!("\"{}\"", v.to_rfc3339()));
        let scope =
            self.scope.as_ref().map_or_else(|| "null".to_owned(), |s| format!("{s:?}"));
        let scope_identifier = self
            .scope_identifier
            .as_ref()
            .map_or_else(|| "null".to_owned(), |s| format!("{s:?}"));

        format!(
            "{{\"kid\":{:?},\"public_key\":{:?},\"valid_from\":{:?},\"valid_until\":{valid_until},\
             \"issued_at\":{:?},\"issuer_kid\":{:?},\"scope\":{scope},\"scope_identifier\":{scope_identifier}}}",
            self.kid,
            STANDARD.encode(self.public_key),
            self.valid_from.to_rfc3339(),
            self.issued_at.to_rfc3339(),
            self.issuer_kid,
        )
    }
}

/// A certificate paired with the root's detached signature over its
/// canonical JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateEnvelope {
    pub certificate: Certificate,
    #[serde(with = "crate::bytes_as_base64")]
    pub signature: Vec<u8>,
}

/// Issues a leaf certificate for a signing key's public half, signed by the
/// currently Active root.
///
/// # Errors
/// Returns [`LicenseError::NoActiveSigningKey`] if there is no Active root,
/// or a keystore/crypto error while signing.
pub async fn issue_signing_certificate(
    db: &Database,
    cache: &PassphraseCache,
    signing_public: [u8; 32],
    kid: &str,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    scope: Option<&str>,
) -> Result<CertificateEnvelope, LicenseError> {
    let root = keystore::find_active_root(db).await?.ok_or_else(|| {
        LicenseError::NoActiveSigningKey {
            message: "no active root key to sign the certificate".into(),
            context: Some("Issuing signing certificate".into()),
        }
    })?;

    let certificate = Certificate {
        kid: kid.to_owned(),
        public_key: signing_public,
        valid_from,
        valid_until,
        issued_at: Utc::now(),
        issuer_kid: root.kid.clone(),
        scope: scope.map(str::to_owned),
        scope_identifier: scope.map(str::to_owned),
    };

    let root_secret = keystore::decrypt_private_key(cache, &root.kid, &root.private_key_encrypted)?;
    let signature = crypto::sign(&root_secret, certificate.canonical_json().as_bytes());

    Ok(CertificateEnvelope { certificate, signature: signature.to_bytes().to_vec() })
}

/// Verifies a certificate envelope: resolves the issuer by `issuer_kid`,
/// requires it to be Active, recomputes the canonical encoding, and checks
/// the signature.
///
/// # Errors
/// Returns [`LicenseError::CertificateInvalid`] if the issuer cannot be
/// found, is not Active, or the signature does not verify.
pub async fn verify_certificate(
    db: &Database,
    envelope: &CertificateEnvelope,
) -> Result<bool, LicenseError> {
    let issuer = keystore::find_by_kid(db, &envelope.certificate.issuer_kid)
        .await?
        .ok_or_else(|| LicenseError::CertificateInvalid {
            message: format!("unknown issuer {}", envelope.certificate.issuer_kid).into(),
            context: None,
        })?;

    if issuer.status != KeyStatus::Active {
        return Err(LicenseError::CertificateInvalid {
            message: format!("issuer {} is not active", issuer.kid).into(),
            context: None,
        });
    }

    let canonical = envelope.certificate.canonical_json();
    match crypto::verify(&issuer.public_key, canonical.as_bytes(), &envelope.signature) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Verifies a certificate envelope against a caller-supplied root public
/// key, without consulting the database. Used for offline token
/// verification, where the only trust anchor is the root public key baked
/// into the client's bundle.
///
/// # Errors
/// Returns [`LicenseError::CertificateInvalid`] if `envelope.certificate.issuer_kid`
/// does not match the envelope's own notion of its issuer, or the signature
/// does not verify.
pub fn verify_certificate_against_root(
    envelope: &CertificateEnvelope,
    root_public_key: &[u8; 32],
) -> Result<bool, LicenseError> {
    let canonical = envelope.certificate.canonical_json();
    match crypto::verify(root_public_key, canonical.as_bytes(), &envelope.signature) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Certificate chain for a signing key: the certificate itself plus a
/// descriptor of the root that issued it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub signing: CertificateEnvelope,
    pub root: RootDescriptor,
}

/// Minimal public-facing description of a root key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootDescriptor {
    pub kid: String,
    #[serde(with = "crate::bytes_as_base64_fixed")]
    pub public_key: [u8; 32],
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<&LicensingKey> for RootDescriptor {
    fn from(key: &LicensingKey) -> Self {
        Self {
            kid: key.kid.clone(),
            public_key: key.public_key,
            valid_from: key.valid_from,
            valid_until: key.valid_until,
        }
    }
}

/// Resolves the full chain (signing cert + root descriptor) for `kid`.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if the signing key or its
/// certificate/root cannot be resolved.
pub async fn chain_for(db: &Database, kid: &str) -> Result<Chain, LicenseError> {
    let signing = keystore::find_by_kid(db, kid).await?.ok_or_else(|| {
        LicenseError::LicenseNotFound {
            message: format!("no signing key with kid {kid}").into(),
            context: Some("Resolving certificate chain".into()),
        }
    })?;

    if signing.key_type != KeyType::Signing {
        return Err(LicenseError::CertificateInvalid {
            message: format!("{kid} is not a signing key").into(),
            context: None,
        });
    }

    let certificate = signing.certificate.clone().ok_or_else(|| LicenseError::CertificateInvalid {
        message: format!("signing key {kid} has no certificate").into(),
        context: None,
    })?;

    let root = keystore::find_by_kid(db, &certificate.certificate.issuer_kid)
        .await?
        .ok_or_else(|| LicenseError::CertificateInvalid {
            message: "issuer root key is missing".into(),
            context: None,
        })?;

    Ok(Chain { signing: certificate, root: RootDescriptor::from(&root) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_has_the_declared_field_order() {
        let cert = Certificate {
            kid: "kid_1".into(),
            public_key: [7u8; 32],
            valid_from: "2025-01-01T00:00:00Z".parse().unwrap(),
            valid_until: None,
            issued_at: "2025-01-01T00:00:00Z".parse().unwrap(),
            issuer_kid: "kid_root".into(),
            scope: None,
            scope_identifier: None,
        };

        let json = cert.canonical_json();
        let kid_pos = json.find("\"kid\"").unwrap();
        let pk_pos = json.find("\"public_key\"").unwrap();
        let issuer_pos = json.find("\"issuer_kid\"").unwrap();
        assert!(kid_pos < pk_pos);
        assert!(pk_pos < issuer_pos);
        assert!(!json.contains(' '));
    }

    #[test]
    fn same_document_encodes_identically() {
        let cert = Certificate {
            kid: "kid_1".into(),
            public_key: [1u8; 32],
            valid_from: "2025-06-01T00:00:00Z".parse().unwrap(),
            valid_until: Some("2025-12-01T00:00:00Z".parse().unwrap()),
            issued_at: "2025-06-01T00:00:00Z".parse().unwrap(),
            issuer_kid: "kid_root".into(),
            scope: Some("acme".into()),
            scope_identifier: Some("acme".into()),
        };

        assert_eq!(cert.canonical_json(), cert.clone().canonical_json());
    }
}
