//! Offline token issuance, verification, and refresh.
//!
//! Tokens are a versioned, public-key signed envelope patterned after the
//! PASETO v4 `public` construction:
//!
//! ```text
//! v4.public.base64url(payload ‖ signature).base64url(footer-json)
//! ```
//!
//! `paseto` implements the bit-exact PAE (pre-authentication encoding) and
//! signing/verification steps; the rest of this module wires that
//! construction to the license/usage/keystore domain.

use crate::ca::{self, Chain};
use crate::crypto;
use crate::error::{LicenseError, LicenseErrorExt};
use crate::keystore::{self, KeyStatus, PassphraseCache};
use crate::license::{self, License, LicenseStatus};
use crate::usage::{self, Usage};
use chrono::{DateTime, Duration, Utc};
use mhub_database::Database;
use mhub_domain::config::LicensingConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// PASETO v4 pre-authentication encoding: a length-prefixed concatenation
/// of an arbitrary number of byte strings, immune to truncation/splicing
/// ambiguity.
pub mod paseto {
    const VERSION_HEADER: &str = "v4.public.";

    #[must_use]
    pub fn pae(pieces: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(pieces.len() as u64).to_le_bytes());
        for piece in pieces {
            out.extend_from_slice(&(piece.len() as u64).to_le_bytes());
            out.extend_from_slice(piece);
        }
        out
    }

    #[must_use]
    pub fn signing_message(payload: &[u8], footer: &[u8], implicit_assertion: &[u8]) -> Vec<u8> {
        pae(&[VERSION_HEADER.as_bytes(), payload, footer, implicit_assertion])
    }
}

fn b64url(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn b64url_decode(s: &str) -> Result<Vec<u8>, LicenseError> {
    use base64::Engine as _;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s).map_err(|e| LicenseError::MalformedToken {
        message: e.to_string().into(),
        context: Some("Decoding base64url segment".into()),
    })
}

/// The reserved claim set always written into an issued token; callers may
/// merge in extra claims, but these names always win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: DateTime<Utc>,
    pub nbf: DateTime<Utc>,
    pub exp: DateTime<Utc>,
    pub kid: String,
    pub license_id: String,
    pub license_key_hash: String,
    pub usage_fingerprint: String,
    pub status: LicenseStatus,
    pub max_usages: Option<u32>,
    pub force_online_after: Option<DateTime<Utc>>,
    pub license_expires_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The footer carried alongside every token: the signing key's `kid` and
/// its certificate chain back to the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Footer {
    pub kid: String,
    pub chain: Chain,
}

/// A verified token's parsed content.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub claims: Claims,
    pub footer: Footer,
}

/// Reserved claim names; caller-supplied extra claims sharing these names
/// are dropped in favor of the core's own values.
const RESERVED: &[&str] = &[
    "iss",
    "sub",
    "iat",
    "nbf",
    "exp",
    "kid",
    "license_id",
    "license_key_hash",
    "usage_fingerprint",
    "status",
    "max_usages",
    "force_online_after",
    "license_expires_at",
    "grace_until",
];

fn sanitize_extra(mut extra: Map<String, Value>) -> Map<String, Value> {
    extra.retain(|key, _| !RESERVED.contains(&key.as_str()));
    extra
}

#[allow(clippy::too_many_arguments)]
async fn issue_inner(
    db: &Database,
    cache: &PassphraseCache,
    config: &LicensingConfig,
    license: &License,
    usage: &Usage,
    issuer_override: Option<&str>,
    ttl: Duration,
    extra_claims: Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<String, LicenseError> {
    let signing = keystore::find_active_signing(db, license.scope.as_deref())
        .await?
        .ok_or_else(|| LicenseError::NoActiveSigningKey {
            message: "no active signing key for this license's scope or globally".into(),
            context: Some(format!("Issuing token for license {}", license.id).into()),
        })?;

    let chain = ca::chain_for(db, &signing.kid).await?;

    let grace_until = (license.status == LicenseStatus::Grace)
        .then(|| {
            license.expires_at.map(|exp| exp + Duration::days(i64::from(license.policy.grace_days(config))))
        })
        .flatten();

    let claims = Claims {
        iss: issuer_override.unwrap_or(&config.issuer).to_owned(),
        sub: license.id.clone(),
        iat: now,
        nbf: now,
        exp: now + ttl,
        kid: signing.kid.clone(),
        license_id: license.id.clone(),
        license_key_hash: hex::encode(license.key_hash),
        usage_fingerprint: usage.fingerprint.clone(),
        status: license.status,
        max_usages: license.max_usages().get(),
        force_online_after: license.policy.force_online_after(config, now),
        license_expires_at: license.expires_at,
        grace_until,
        extra: sanitize_extra(extra_claims),
    };

    let payload = serde_json::to_vec(&claims)
        .map_err(|source| LicenseError::Serde { source, context: Some("Serializing claims".into()) })?;
    let footer = Footer { kid: signing.kid.clone(), chain };
    let footer_bytes = serde_json::to_vec(&footer)
        .map_err(|source| LicenseError::Serde { source, context: Some("Serializing footer".into()) })?;

    let message = paseto::signing_message(&payload, &footer_bytes, b"");
    let secret = keystore::decrypt_private_key(cache, &signing.kid, &signing.private_key_encrypted)?;
    let signature = crypto::sign(&secret, &message);

    let mut signed_payload = payload;
    signed_payload.extend_from_slice(&signature.to_bytes());

    tracing::info!(
        license_id = %license.id,
        kid = %signing.kid,
        usage_id = %usage.id,
        "token issued"
    );

    Ok(format!("v4.public.{}.{}", b64url(&signed_payload), b64url(&footer_bytes)))
}

/// Issues a token for `(license, usage)`. Signing key selection prefers
/// `license.scope`, falling back to the global signing key.
///
/// # Errors
/// Returns [`LicenseError::NoActiveSigningKey`] if no signing key is
/// available for the license's scope or globally.
pub async fn issue(
    db: &Database,
    cache: &PassphraseCache,
    config: &LicensingConfig,
    license: &License,
    usage: &Usage,
    extra_claims: Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<String, LicenseError> {
    let ttl = Duration::days(i64::from(license.policy.token_ttl_days(config)));
    issue_inner(db, cache, config, license, usage, None, ttl, extra_claims, now).await
}

/// Issues a token with an explicit TTL override, bypassing the license's
/// configured default (used by `offline:issue --ttl`).
///
/// # Errors
/// Same as [`issue`].
pub async fn issue_with_ttl(
    db: &Database,
    cache: &PassphraseCache,
    config: &LicensingConfig,
    license: &License,
    usage: &Usage,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, LicenseError> {
    issue_inner(db, cache, config, license, usage, None, ttl, Map::new(), now).await
}

struct ParsedEnvelope {
    message: Vec<u8>,
    signature: [u8; 64],
    footer_bytes: Vec<u8>,
    footer: Footer,
}

fn parse_envelope(token: &str) -> Result<ParsedEnvelope, LicenseError> {
    let mut parts = token.split('.');
    let (Some("v4"), Some("public"), Some(payload_b64), Some(footer_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(LicenseError::MalformedToken {
            message: "expected exactly four dot-separated segments (v4.public.<payload>.<footer>)".into(),
            context: None,
        });
    };

    let signed_payload = b64url_decode(payload_b64)?;
    if signed_payload.len() < 64 {
        return Err(LicenseError::MalformedToken {
            message: "payload segment shorter than one Ed25519 signature".into(),
            context: None,
        });
    }
    let split_at = signed_payload.len() - 64;
    let message = signed_payload[..split_at].to_vec();
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&signed_payload[split_at..]);

    let footer_bytes = b64url_decode(footer_b64)?;
    let footer: Footer = serde_json::from_slice(&footer_bytes)
        .map_err(|source| LicenseError::Serde { source, context: Some("Parsing token footer".into()) })?;

    Ok(ParsedEnvelope { message, signature, footer_bytes, footer })
}

fn parse_claims(message: &[u8]) -> Result<Claims, LicenseError> {
    serde_json::from_slice(message)
        .map_err(|source| LicenseError::Serde { source, context: Some("Parsing token claims".into()) })
}

/// Caller-supplied verification overrides.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions<'a> {
    pub subject: Option<&'a str>,
    pub issuer: Option<&'a str>,
}

fn enforce_claims(
    claims: &Claims,
    config: &LicensingConfig,
    license: Option<&License>,
    options: &VerifyOptions<'_>,
    now: DateTime<Utc>,
) -> Result<(), LicenseError> {
    let issuer = options.issuer.unwrap_or(&config.issuer);
    if claims.iss != issuer {
        return Err(LicenseError::MalformedToken {
            message: format!("unexpected issuer {:?}", claims.iss).into(),
            context: None,
        });
    }

    if let Some(subject) = options.subject {
        if claims.sub != subject {
            return Err(LicenseError::MalformedToken {
                message: "token subject does not match the requested subject".into(),
                context: None,
            });
        }
    }

    if claims.exp <= now {
        return Err(LicenseError::MalformedToken {
            message: format!("token expired at {}", claims.exp).into(),
            context: Some("exp".into()),
        });
    }

    let skew = license.map_or(config.default_clock_skew_seconds, |l| l.policy.clock_skew_seconds(config));
    let skew = Duration::seconds(i64::from(skew));

    if claims.nbf - now > skew {
        return Err(LicenseError::MalformedToken {
            message: "token is not yet valid beyond the allowed clock skew".into(),
            context: Some("nbf".into()),
        });
    }
    if claims.iat - now > skew {
        return Err(LicenseError::MalformedToken {
            message: "token was issued too far in the future beyond the allowed clock skew".into(),
            context: Some("iat".into()),
        });
    }

    if let Some(force_online_after) = claims.force_online_after {
        if force_online_after <= now {
            return Err(LicenseError::OnlineCheckRequired {
                message: format!("force_online_after passed at {force_online_after}").into(),
                context: None,
            });
        }
    }

    Ok(())
}

/// Verifies a token against the server's own key store: resolves the
/// signing key by the footer's `kid`, requires it Active, checks the
/// Ed25519 signature, then enforces the claim contract in full.
///
/// # Errors
/// - [`LicenseError::MalformedToken`] if the envelope cannot be parsed.
/// - [`LicenseError::SigningKeyRevoked`] if the resolved key is not Active.
/// - [`LicenseError::BadSignature`] if the signature does not verify.
/// - [`LicenseError::OnlineCheckRequired`] if `force_online_after` has passed.
pub async fn verify(
    db: &Database,
    config: &LicensingConfig,
    token: &str,
    options: &VerifyOptions<'_>,
    now: DateTime<Utc>,
) -> Result<VerifiedToken, LicenseError> {
    let envelope = parse_envelope(token)?;

    let key = keystore::find_by_kid(db, &envelope.footer.kid).await?.ok_or_else(|| {
        LicenseError::SigningKeyRevoked {
            message: format!("unknown signing key {}", envelope.footer.kid).into(),
            context: None,
        }
    })?;
    if key.status != KeyStatus::Active {
        return Err(LicenseError::SigningKeyRevoked {
            message: format!("signing key {} is {:?}", key.kid, key.status).into(),
            context: None,
        });
    }

    let message = paseto::signing_message(&envelope.message, &envelope.footer_bytes, b"");
    crypto::verify(&key.public_key, &message, &envelope.signature)?;

    let claims = parse_claims(&envelope.message)?;
    let license = license::find_by_id(db, &claims.license_id).await?;
    enforce_claims(&claims, config, license.as_ref(), options, now)?;

    Ok(VerifiedToken { claims, footer: envelope.footer })
}

/// Verifies a token purely offline: the signing public key and certificate
/// chain come from the token's own footer, validated against the root
/// public key declared in `bundle_root_public_key`. No database access.
///
/// # Errors
/// - [`LicenseError::CertificateInvalid`] if the chain's declared root does
///   not match `bundle_root_public_key`, or the certificate fails to verify.
/// - Otherwise the same error set as [`verify`].
pub fn verify_offline(
    config: &LicensingConfig,
    token: &str,
    bundle_root_public_key: &[u8; 32],
    options: &VerifyOptions<'_>,
    now: DateTime<Utc>,
) -> Result<VerifiedToken, LicenseError> {
    let envelope = parse_envelope(token)?;

    if envelope.footer.chain.root.public_key != *bundle_root_public_key {
        return Err(LicenseError::CertificateInvalid {
            message: "token's chain root does not match the trusted bundle root".into(),
            context: None,
        });
    }

    if !ca::verify_certificate_against_root(&envelope.footer.chain.signing, bundle_root_public_key)? {
        return Err(LicenseError::CertificateInvalid {
            message: "signing certificate failed verification against the trusted root".into(),
            context: None,
        });
    }

    let signing_public_key = envelope.footer.chain.signing.certificate.public_key;
    let message = paseto::signing_message(&envelope.message, &envelope.footer_bytes, b"");
    crypto::verify(&signing_public_key, &message, &envelope.signature)?;

    let claims = parse_claims(&envelope.message)?;
    enforce_claims(&claims, config, None, options, now)?;

    Ok(VerifiedToken { claims, footer: envelope.footer })
}

/// Re-issues a token from an existing one: resolves the license and usage
/// named by the original token's claims and signs a fresh envelope. Does
/// not extend the license's own `expires_at`.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if the license or usage named
/// by the token no longer exists, plus the same error set as [`issue`].
pub async fn refresh(
    db: &Database,
    cache: &PassphraseCache,
    config: &LicensingConfig,
    token: &str,
    now: DateTime<Utc>,
) -> Result<String, LicenseError> {
    let envelope = parse_envelope(token)?;
    let claims = parse_claims(&envelope.message)?;

    let license = license::find_by_id(db, &claims.license_id).await?.ok_or_else(|| {
        LicenseError::LicenseNotFound {
            message: format!("no license with id {}", claims.license_id).into(),
            context: Some("Refreshing token".into()),
        }
    })?;

    let usage = usage::find_by_fingerprint(db, config, &license, &claims.usage_fingerprint)
        .await?
        .ok_or_else(|| LicenseError::LicenseNotFound {
            message: format!("no usage for fingerprint under license {}", license.id).into(),
            context: Some("Refreshing token".into()),
        })?;

    issue(db, cache, config, &license, &usage, Map::new(), now).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pae_length_prefixes_each_piece() {
        let encoded = paseto::pae(&[b"ab", b"c"]);
        // 8 bytes piece count + (8 bytes len + 2 bytes) + (8 bytes len + 1 byte)
        assert_eq!(encoded.len(), 8 + 8 + 2 + 8 + 1);
        assert_eq!(&encoded[..8], &2u64.to_le_bytes());
    }

    #[test]
    fn pae_distinguishes_differently_split_inputs() {
        // Classic PAE motivating example: ("", "ab") vs ("a", "b") must differ.
        let a = paseto::pae(&[b"", b"ab"]);
        let b = paseto::pae(&[b"a", b"b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn sanitize_extra_drops_reserved_names() {
        let mut extra = Map::new();
        extra.insert("sub".into(), Value::String("attacker-controlled".into()));
        extra.insert("campaign".into(), Value::String("spring-promo".into()));

        let sanitized = sanitize_extra(extra);
        assert!(!sanitized.contains_key("sub"));
        assert!(sanitized.contains_key("campaign"));
    }

    #[test]
    fn parse_envelope_rejects_wrong_segment_count() {
        let err = parse_envelope("v4.public.onlythree");
        assert!(matches!(err, Err(LicenseError::MalformedToken { .. })));
    }

    #[test]
    fn parse_envelope_rejects_non_v4_public_header() {
        let err = parse_envelope("v3.local.abc.def");
        assert!(matches!(err, Err(LicenseError::MalformedToken { .. })));
    }
}
