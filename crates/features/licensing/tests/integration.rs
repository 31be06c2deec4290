//! Cross-module integration tests that don't need a running store: a root
//! key certifying a signing key, and that certificate verified the way an
//! offline client would — against a baked-in root public key, with no
//! database in the loop.

use chrono::{Duration, Utc};
use mhub_licensing::ca::{self, Certificate, CertificateEnvelope};
use mhub_licensing::codec;
use mhub_licensing::crypto;

#[test]
fn offline_client_can_verify_a_certificate_against_the_bundled_root() {
    let (root_signing, root_public) = crypto::generate_keypair().expect("root keypair");
    let (signing_signing, signing_public) = crypto::generate_keypair().expect("signing keypair");

    let now = Utc::now();
    let certificate = Certificate {
        kid: "kid_signing_1".into(),
        public_key: signing_public.to_bytes(),
        valid_from: now,
        valid_until: Some(now + Duration::days(120)),
        issued_at: now,
        issuer_kid: "kid_root_1".into(),
        scope: Some("acme".into()),
        scope_identifier: Some("acme".into()),
    };

    let signature = crypto::sign(&root_signing.to_bytes(), certificate.canonical_json().as_bytes());
    let envelope = CertificateEnvelope { certificate, signature: signature.to_bytes().to_vec() };

    assert!(ca::verify_certificate_against_root(&envelope, &root_public.to_bytes()).unwrap());
}

#[test]
fn offline_verification_rejects_a_certificate_signed_by_a_different_root() {
    let (_root_signing, root_public) = crypto::generate_keypair().expect("root keypair");
    let (impostor_signing, _impostor_public) = crypto::generate_keypair().expect("impostor keypair");
    let (_signing_signing, signing_public) = crypto::generate_keypair().expect("signing keypair");

    let now = Utc::now();
    let certificate = Certificate {
        kid: "kid_signing_1".into(),
        public_key: signing_public.to_bytes(),
        valid_from: now,
        valid_until: None,
        issued_at: now,
        issuer_kid: "kid_root_1".into(),
        scope: None,
        scope_identifier: None,
    };

    let signature =
        crypto::sign(&impostor_signing.to_bytes(), certificate.canonical_json().as_bytes());
    let envelope = CertificateEnvelope { certificate, signature: signature.to_bytes().to_vec() };

    assert!(!ca::verify_certificate_against_root(&envelope, &root_public.to_bytes()).unwrap());
}

#[test]
fn a_tampered_certificate_field_breaks_the_signature() {
    let (root_signing, root_public) = crypto::generate_keypair().expect("root keypair");
    let (_signing_signing, signing_public) = crypto::generate_keypair().expect("signing keypair");

    let now = Utc::now();
    let certificate = Certificate {
        kid: "kid_signing_1".into(),
        public_key: signing_public.to_bytes(),
        valid_from: now,
        valid_until: None,
        issued_at: now,
        issuer_kid: "kid_root_1".into(),
        scope: Some("acme".into()),
        scope_identifier: Some("acme".into()),
    };
    let signature = crypto::sign(&root_signing.to_bytes(), certificate.canonical_json().as_bytes());
    let mut envelope = CertificateEnvelope { certificate, signature: signature.to_bytes().to_vec() };

    envelope.certificate.scope = Some("globex".into());

    assert!(!ca::verify_certificate_against_root(&envelope, &root_public.to_bytes()).unwrap());
}

#[test]
fn a_license_key_presented_with_the_wrong_salt_does_not_verify() {
    let key = codec::generate("MHUB").expect("key generates");
    let stored = codec::hash(b"tenant-a-salt", &key);

    assert!(codec::verify(b"tenant-a-salt", &key, &stored));
    assert!(!codec::verify(b"tenant-b-salt", &key, &stored));
}
