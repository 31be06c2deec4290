//! End-to-end scenarios against an in-memory Surreal store (`mem://`, the
//! configured default): seat exhaustion, heartbeat idempotence,
//! auto-replace-oldest, a token's full issue/verify round trip, a revoked
//! signing key, and the Active → Grace → Expired transition. These are the
//! paths `tests/integration.rs`'s offline certificate/codec tests don't
//! reach because they never touch a store.

#![cfg(feature = "server")]

use chrono::{DateTime, Duration, Utc};
use mhub_audit::AuditContext;
use mhub_database::Database;
use mhub_domain::config::LicensingConfig;
use mhub_licensing::keystore::{self, KeyType, LicensingKey, PassphraseCache};
use mhub_licensing::license::{self, License, LicensePolicy, LicenseStatus, MaxUsages};
use mhub_licensing::token::{self, VerifyOptions};
use mhub_licensing::usage::{self, RegisterOutcome, UsageMetadata, UsageStatus};
use mhub_licensing::{ca, sweep, LicenseError};
use serde_json::Map;

async fn new_db() -> Database {
    Database::builder()
        .url("mem://")
        .session("licensing_test", "licensing_test")
        .init()
        .await
        .expect("connect to mem://")
}

async fn setup_active_license(
    db: &Database,
    key: &str,
    max_usages: MaxUsages,
    policy: LicensePolicy,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> License {
    let license = license::create(
        db,
        b"store-scenario-salt",
        key,
        "customer",
        "cust_1",
        max_usages,
        expires_at,
        None,
        policy,
        None,
    )
    .await
    .expect("create license");

    license::activate(db, &license.id, now).await.expect("activate license")
}

async fn setup_signing_key(db: &Database, cache: &PassphraseCache, now: DateTime<Utc>) -> LicensingKey {
    let root =
        keystore::create(db, cache, KeyType::Root, None, now, None).await.expect("create root key");
    let signing = keystore::create(db, cache, KeyType::Signing, None, now, Some(now + Duration::days(120)))
        .await
        .expect("create signing key");

    let certificate = ca::issue_signing_certificate(
        db,
        cache,
        signing.public_key,
        &signing.kid,
        now,
        Some(now + Duration::days(120)),
        None,
    )
    .await
    .expect("issue signing certificate");
    keystore::attach_certificate(db, &signing.kid, certificate).await.expect("attach certificate");

    assert!(root.is_active_at(now));
    keystore::find_by_kid(db, &signing.kid)
        .await
        .expect("query signing key")
        .expect("signing key with its certificate attached")
}

#[tokio::test]
async fn seat_exhaustion_is_rejected_by_default_policy() {
    let db = new_db().await;
    let now = Utc::now();
    let license =
        setup_active_license(&db, "MHUB-SEAT-0001", MaxUsages::limited(1), LicensePolicy::default(), None, now)
            .await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (_first, outcome) =
        usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, now)
            .await
            .expect("first registration fits under capacity");
    assert_eq!(outcome, RegisterOutcome::Registered);

    let err = usage::register(
        &db,
        &config,
        &license,
        "fp-2",
        UsageMetadata::default(),
        &audit,
        now + Duration::seconds(1),
    )
    .await
    .expect_err("a second distinct fingerprint exceeds a one-seat license");

    assert!(matches!(err, LicenseError::LimitReached { .. }));
}

#[tokio::test]
async fn registering_the_same_fingerprint_twice_is_a_heartbeat() {
    let db = new_db().await;
    let now = Utc::now();
    let license = setup_active_license(
        &db,
        "MHUB-HEARTBEAT-0001",
        MaxUsages::limited(3),
        LicensePolicy::default(),
        None,
        now,
    )
    .await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (first, outcome) =
        usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, now)
            .await
            .expect("first registration");
    assert_eq!(outcome, RegisterOutcome::Registered);

    let later = now + Duration::seconds(30);
    let (second, outcome) =
        usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, later)
            .await
            .expect("second registration of the same fingerprint");
    assert_eq!(outcome, RegisterOutcome::Heartbeat);
    assert_eq!(second.id, first.id);
    assert_eq!(second.last_seen_at, later);

    let active = usage::find_active_for_license(&db, &license.id).await.expect("query active usages");
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn over_limit_auto_replace_revokes_the_oldest_usage() {
    let db = new_db().await;
    let now = Utc::now();
    let mut policy = LicensePolicy::default();
    policy.over_limit_policy = Some("auto_replace_oldest".into());
    let license =
        setup_active_license(&db, "MHUB-REPLACE-0001", MaxUsages::limited(1), policy, None, now).await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (oldest, _) = usage::register(&db, &config, &license, "fp-old", UsageMetadata::default(), &audit, now)
        .await
        .expect("first registration");

    let later = now + Duration::seconds(60);
    let (newest, outcome) =
        usage::register(&db, &config, &license, "fp-new", UsageMetadata::default(), &audit, later)
            .await
            .expect("over-capacity registration replaces the oldest seat");
    assert_eq!(outcome, RegisterOutcome::Registered);
    assert_ne!(newest.id, oldest.id);

    let replaced =
        usage::find_by_id(&db, &oldest.id).await.expect("query the replaced usage").expect("row still exists");
    assert_eq!(replaced.status, UsageStatus::Revoked);

    let active = usage::find_active_for_license(&db, &license.id).await.expect("query active usages");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, newest.id);
}

#[tokio::test]
async fn a_freshly_issued_token_verifies_against_the_server_keystore() {
    let db = new_db().await;
    let cache = PassphraseCache::new();
    cache.set("store-scenario-passphrase");
    let now = Utc::now();

    let signing = setup_signing_key(&db, &cache, now).await;
    let license =
        setup_active_license(&db, "MHUB-TOKEN-0001", MaxUsages::limited(5), LicensePolicy::default(), None, now)
            .await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (usage, _) = usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, now)
        .await
        .expect("register usage");

    let issued = token::issue(&db, &cache, &config, &license, &usage, Map::new(), now)
        .await
        .expect("issue token");

    let verified = token::verify(&db, &config, &issued, &VerifyOptions::default(), now)
        .await
        .expect("verify a freshly issued token");

    assert_eq!(verified.claims.license_id, license.id);
    assert_eq!(verified.claims.usage_fingerprint, "fp-1");
    assert_eq!(verified.claims.status, LicenseStatus::Active);
    assert_eq!(verified.footer.kid, signing.kid);
}

#[tokio::test]
async fn a_token_signed_by_a_since_revoked_key_fails_verification() {
    let db = new_db().await;
    let cache = PassphraseCache::new();
    cache.set("store-scenario-passphrase");
    let now = Utc::now();

    let signing = setup_signing_key(&db, &cache, now).await;
    let license = setup_active_license(
        &db,
        "MHUB-REVOKED-KEY-0001",
        MaxUsages::limited(5),
        LicensePolicy::default(),
        None,
        now,
    )
    .await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (usage, _) = usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, now)
        .await
        .expect("register usage");

    let issued = token::issue(&db, &cache, &config, &license, &usage, Map::new(), now)
        .await
        .expect("issue token");

    keystore::revoke(&db, &signing.kid, "compromised", now).await.expect("revoke the signing key");

    let err = token::verify(&db, &config, &issued, &VerifyOptions::default(), now)
        .await
        .expect_err("a token signed by a revoked key must not verify");
    assert!(matches!(err, LicenseError::SigningKeyRevoked { .. }));
}

#[tokio::test]
async fn an_expired_license_transitions_to_grace_without_revoking_usages() {
    let db = new_db().await;
    let now = Utc::now();
    let expires_at = now - Duration::days(1);
    let license = setup_active_license(
        &db,
        "MHUB-GRACE-0001",
        MaxUsages::limited(5),
        LicensePolicy::default(),
        Some(expires_at),
        now,
    )
    .await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (usage, _) = usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, now)
        .await
        .expect("register usage before the expiration sweep runs");

    let report = sweep::run_expiration_sweep(&db, &config, &audit, now).await.expect("sweep runs");
    assert_eq!(report.transitioned_to_grace, 1);
    assert_eq!(report.transitioned_to_expired, 0);

    let reloaded =
        license::find_by_id(&db, &license.id).await.expect("query license").expect("license still exists");
    assert_eq!(reloaded.status, LicenseStatus::Grace);

    let still_active =
        usage::find_by_id(&db, &usage.id).await.expect("query usage").expect("usage still exists");
    assert_eq!(still_active.status, UsageStatus::Active);
}

#[tokio::test]
async fn a_license_past_its_grace_window_expires_and_revokes_its_usages() {
    let db = new_db().await;
    let now = Utc::now();
    // `LicensingConfig::default_grace_days` is 14; 20 days past `expires_at`
    // clears the grace window in the same sweep pass that first transitions
    // the license from Active to Grace.
    let expires_at = now - Duration::days(20);
    let license = setup_active_license(
        &db,
        "MHUB-EXPIRED-0001",
        MaxUsages::limited(5),
        LicensePolicy::default(),
        Some(expires_at),
        now,
    )
    .await;
    let config = LicensingConfig::default();
    let audit = AuditContext::system(false);

    let (usage, _) = usage::register(&db, &config, &license, "fp-1", UsageMetadata::default(), &audit, now)
        .await
        .expect("register usage before the expiration sweep runs");

    let report = sweep::run_expiration_sweep(&db, &config, &audit, now).await.expect("sweep runs");
    assert_eq!(report.transitioned_to_grace, 1);
    assert_eq!(report.transitioned_to_expired, 1);
    assert_eq!(report.usages_revoked_on_expiry, 1);

    let reloaded =
        license::find_by_id(&db, &license.id).await.expect("query license").expect("license still exists");
    assert_eq!(reloaded.status, LicenseStatus::Expired);

    let revoked = usage::find_by_id(&db, &usage.id).await.expect("query usage").expect("usage still exists");
    assert_eq!(revoked.status, UsageStatus::Revoked);
}
