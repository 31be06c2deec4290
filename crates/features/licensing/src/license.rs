//! License entity, state machine, and policy resolution.
//!
//! ```text
//! Pending ──activate()──▶ Active
//! Active ──expires_at passed──▶ Grace
//! Grace ──grace_days elapsed──▶ Expired
//! Active|Grace|Expired ──renew(new_exp)──▶ Active
//! Active|Grace ──suspend()──▶ Suspended
//! Suspended ──(manual)──▶ Active
//! Active|Grace|Pending|Suspended|Expired ──cancel()──▶ Cancelled  (terminal)
//! ```

use crate::codec;
use crate::error::{LicenseError, LicenseErrorExt};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use mhub_database::Database;
use mhub_domain::config::LicensingConfig;
use mhub_kernel::safe_nanoid;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`License`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Pending,
    Active,
    Grace,
    Expired,
    Suspended,
    Cancelled,
}

/// Action taken when a registration would exceed `max_usages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverLimitPolicy {
    Reject,
    AutoReplaceOldest,
}

impl OverLimitPolicy {
    fn parse(raw: &str) -> Self {
        match raw {
            "auto_replace_oldest" => Self::AutoReplaceOldest,
            _ => Self::Reject,
        }
    }
}

/// Scope over which fingerprint uniqueness is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintUniqueness {
    PerLicense,
    Global,
}

impl FingerprintUniqueness {
    fn parse(raw: &str) -> Self {
        match raw {
            "global" => Self::Global,
            _ => Self::PerLicense,
        }
    }
}

/// Non-negative usage cap, or unlimited.
///
/// The API surface is `Option<u32>` (`None` = unlimited); storage uses an
/// `i64` with `-1` as the unlimited sentinel, matching how similar
/// license-seat systems represent it at the column level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxUsages(Option<u32>);

impl MaxUsages {
    #[must_use]
    pub const fn unlimited() -> Self {
        Self(None)
    }

    #[must_use]
    pub const fn limited(n: u32) -> Self {
        Self(Some(n))
    }

    #[must_use]
    pub fn get(self) -> Option<u32> {
        self.0
    }

    /// Whether one more active usage would still respect the cap.
    #[must_use]
    pub fn allows(self, active_count: u32) -> bool {
        self.0.is_none_or(|max| active_count < max)
    }

    pub(crate) fn to_storage(self) -> i64 {
        self.0.map_or(-1, i64::from)
    }

    pub(crate) fn from_storage(raw: i64) -> Self {
        match u32::try_from(raw) {
            Ok(n) => Self(Some(n)),
            Err(_) => Self(None),
        }
    }
}

/// Per-license overrides of the process-wide [`LicensingConfig`] defaults.
///
/// Every getter here follows the same lookup order: a `Some` override
/// wins; otherwise the configured default applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LicensePolicy {
    pub over_limit_policy: Option<String>,
    pub grace_days: Option<u32>,
    pub inactivity_auto_revoke_days: Option<u32>,
    pub fingerprint_uniqueness: Option<String>,
    pub token_ttl_days: Option<u32>,
    pub force_online_after_days: Option<u32>,
    pub clock_skew_seconds: Option<u32>,
}

impl LicensePolicy {
    #[must_use]
    pub fn over_limit_policy(&self, defaults: &LicensingConfig) -> OverLimitPolicy {
        let raw = self.over_limit_policy.as_deref().unwrap_or(&defaults.default_over_limit_policy);
        OverLimitPolicy::parse(raw)
    }

    #[must_use]
    pub fn fingerprint_uniqueness(&self, defaults: &LicensingConfig) -> FingerprintUniqueness {
        let raw =
            self.fingerprint_uniqueness.as_deref().unwrap_or(&defaults.default_fingerprint_uniqueness);
        FingerprintUniqueness::parse(raw)
    }

    #[must_use]
    pub fn grace_days(&self, defaults: &LicensingConfig) -> u32 {
        self.grace_days.unwrap_or(defaults.default_grace_days)
    }

    #[must_use]
    pub fn inactivity_auto_revoke_days(&self) -> Option<u32> {
        self.inactivity_auto_revoke_days
    }

    #[must_use]
    pub fn token_ttl_days(&self, defaults: &LicensingConfig) -> u32 {
        self.token_ttl_days.unwrap_or(defaults.default_token_ttl_days)
    }

    #[must_use]
    pub fn clock_skew_seconds(&self, defaults: &LicensingConfig) -> u32 {
        self.clock_skew_seconds.unwrap_or(defaults.default_clock_skew_seconds)
    }

    /// Resolves the absolute `force_online_after` instant for a token issued
    /// at `now`, or `None` if the resolved interval is zero (disabled).
    #[must_use]
    pub fn force_online_after(
        &self,
        defaults: &LicensingConfig,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let days = self.force_online_after_days.unwrap_or(defaults.default_force_online_after_days);
        (days > 0).then(|| now + Duration::days(i64::from(days)))
    }
}

/// A license: the aggregate whose active-usage count [`crate::usage::register`]
/// protects by re-fetching this row under [`crate::lock`]'s per-id guard
/// before deciding whether a new seat fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: String,
    #[serde(with = "crate::bytes_as_base64_fixed")]
    pub key_hash: [u8; 32],
    pub status: LicenseStatus,
    pub owner_kind: String,
    pub owner_id: String,
    #[serde(rename = "max_usages")]
    max_usages_raw: i64,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub policy: LicensePolicy,
    pub encrypted_key_copy: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl License {
    #[must_use]
    pub fn max_usages(&self) -> MaxUsages {
        MaxUsages::from_storage(self.max_usages_raw)
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self.status, LicenseStatus::Active | LicenseStatus::Grace)
    }

    #[must_use]
    pub fn in_grace_expired(&self, defaults: &LicensingConfig, now: DateTime<Utc>) -> bool {
        self.status == LicenseStatus::Grace
            && self
                .expires_at
                .is_some_and(|exp| exp + Duration::days(i64::from(self.policy.grace_days(defaults))) < now)
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    db: &Database,
    salt: &[u8],
    plaintext_key: &str,
    owner_kind: &str,
    owner_id: &str,
    max_usages: MaxUsages,
    expires_at: Option<DateTime<Utc>>,
    scope: Option<&str>,
    policy: LicensePolicy,
    encrypted_key_copy: Option<Vec<u8>>,
) -> Result<License, LicenseError> {
    let license = License {
        id: format!("lic_{}", safe_nanoid!()),
        key_hash: codec::hash(salt, plaintext_key),
        status: LicenseStatus::Pending,
        owner_kind: owner_kind.to_owned(),
        owner_id: owner_id.to_owned(),
        max_usages_raw: max_usages.to_storage(),
        activated_at: None,
        expires_at,
        scope: scope.map(str::to_owned),
        policy,
        encrypted_key_copy,
        created_at: Utc::now(),
    };

    let _: Option<License> = db
        .query("CREATE licenses CONTENT $license")
        .bind(("license", license.clone()))
        .await
        .context("Persisting new license")?
        .take(0)
        .context("Parsing created license")?;

    tracing::info!(id = %license.id, owner_kind, owner_id, "license created");
    Ok(license)
}

/// Looks up a license by id.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_by_id(db: &Database, id: &str) -> Result<Option<License>, LicenseError> {
    db.query("SELECT * FROM licenses WHERE id = $id LIMIT 1")
        .bind(("id", id.to_owned()))
        .await
        .context("Querying license by id")?
        .take(0)
        .context("Parsing license by id")
}

/// Looks up a license by its activation key, hashing `key` with `salt` first.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_by_key(db: &Database, salt: &[u8], key: &str) -> Result<Option<License>, LicenseError> {
    let hash = STANDARD.encode(codec::hash(salt, key));
    db.query("SELECT * FROM licenses WHERE key_hash = $hash LIMIT 1")
        .bind(("hash", hash))
        .await
        .context("Querying license by key hash")?
        .take(0)
        .context("Parsing license by key hash")
}

async fn require(db: &Database, id: &str) -> Result<License, LicenseError> {
    find_by_id(db, id).await?.ok_or_else(|| LicenseError::LicenseNotFound {
        message: format!("no license with id {id}").into(),
        context: None,
    })
}

/// Activates a Pending license.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotUsable`] if the license is not Pending.
pub async fn activate(db: &Database, id: &str, now: DateTime<Utc>) -> Result<License, LicenseError> {
    let existing = require(db, id).await?;
    if existing.status != LicenseStatus::Pending {
        return Err(LicenseError::LicenseNotUsable {
            message: format!("license {id} is not Pending").into(),
            context: Some("Activating license".into()),
        });
    }

    db.query("UPDATE licenses SET status = 'active', activated_at = $now WHERE id = $id")
        .bind(("id", id.to_owned()))
        .bind(("now", now))
        .await
        .context("Activating license")?;

    tracing::info!(id, "license activated");
    Ok(License { status: LicenseStatus::Active, activated_at: Some(now), ..existing })
}

/// A completed renewal period, recorded alongside the license's new expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRenewal {
    pub id: String,
    pub license_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Renews a license to `new_expires_at`, recording the elapsed period and
/// returning the license to Active.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotUsable`] if the license is Cancelled.
pub async fn renew(
    db: &Database,
    id: &str,
    new_expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<License, LicenseError> {
    let existing = require(db, id).await?;
    if existing.status == LicenseStatus::Cancelled {
        return Err(LicenseError::LicenseNotUsable {
            message: "cancelled licenses cannot be renewed".into(),
            context: Some(format!("Renewing license {id}").into()),
        });
    }

    let renewal = LicenseRenewal {
        id: format!("ren_{}", safe_nanoid!()),
        license_id: id.to_owned(),
        period_start: existing.expires_at.unwrap_or(now),
        period_end: new_expires_at,
        created_at: now,
    };

    let _: Option<LicenseRenewal> = db
        .query("CREATE license_renewals CONTENT $renewal")
        .bind(("renewal", renewal))
        .await
        .context("Recording renewal")?
        .take(0)
        .context("Parsing renewal")?;

    db.query("UPDATE licenses SET status = 'active', expires_at = $exp WHERE id = $id")
        .bind(("id", id.to_owned()))
        .bind(("exp", new_expires_at))
        .await
        .context("Applying renewal")?;

    tracing::info!(id, %new_expires_at, "license renewed");
    Ok(License { status: LicenseStatus::Active, expires_at: Some(new_expires_at), ..existing })
}

/// Suspends an Active or Grace license.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotUsable`] if the license is not usable.
pub async fn suspend(db: &Database, id: &str) -> Result<License, LicenseError> {
    let existing = require(db, id).await?;
    if !existing.is_usable() {
        return Err(LicenseError::LicenseNotUsable {
            message: format!("license {id} is not Active or Grace").into(),
            context: Some("Suspending license".into()),
        });
    }

    db.query("UPDATE licenses SET status = 'suspended' WHERE id = $id")
        .bind(("id", id.to_owned()))
        .await
        .context("Suspending license")?;

    tracing::info!(id, "license suspended");
    Ok(License { status: LicenseStatus::Suspended, ..existing })
}

/// Manually reactivates a Suspended license back to Active.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotUsable`] if the license is not Suspended.
pub async fn reactivate(db: &Database, id: &str) -> Result<License, LicenseError> {
    let existing = require(db, id).await?;
    if existing.status != LicenseStatus::Suspended {
        return Err(LicenseError::LicenseNotUsable {
            message: format!("license {id} is not Suspended").into(),
            context: Some("Reactivating license".into()),
        });
    }

    db.query("UPDATE licenses SET status = 'active' WHERE id = $id")
        .bind(("id", id.to_owned()))
        .await
        .context("Reactivating license")?;

    tracing::info!(id, "license reactivated");
    Ok(License { status: LicenseStatus::Active, ..existing })
}

/// Cancels a license, terminally. Idempotent: cancelling an already
/// Cancelled license is a no-op that returns its current state.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn cancel(db: &Database, id: &str) -> Result<License, LicenseError> {
    let existing = require(db, id).await?;
    if existing.status == LicenseStatus::Cancelled {
        return Ok(existing);
    }

    db.query("UPDATE licenses SET status = 'cancelled' WHERE id = $id")
        .bind(("id", id.to_owned()))
        .await
        .context("Cancelling license")?;

    tracing::info!(id, "license cancelled");
    Ok(License { status: LicenseStatus::Cancelled, ..existing })
}

/// Licenses Active with a passed `expires_at`, oldest id first — sweep input.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_expiring(db: &Database, now: DateTime<Utc>) -> Result<Vec<License>, LicenseError> {
    db.query(
        "SELECT * FROM licenses \
         WHERE status = 'active' AND expires_at != NONE AND expires_at < $now \
         ORDER BY id",
    )
    .bind(("now", now))
    .await
    .context("Querying expiring licenses")?
    .take(0)
    .context("Parsing expiring licenses")
}

/// Licenses currently in Grace, oldest id first — sweep input; the caller
/// applies `in_grace_expired` per-row since the grace window may be
/// license-overridden.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_in_grace(db: &Database) -> Result<Vec<License>, LicenseError> {
    db.query("SELECT * FROM licenses WHERE status = 'grace' ORDER BY id")
        .await
        .context("Querying licenses in grace")?
        .take(0)
        .context("Parsing licenses in grace")
}

/// Transitions a license from Active to Grace. Guarded by the WHERE clause
/// so reruns against an already-transitioned row are a no-op.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn mark_grace(db: &Database, id: &str) -> Result<(), LicenseError> {
    db.query("UPDATE licenses SET status = 'grace' WHERE id = $id AND status = 'active'")
        .bind(("id", id.to_owned()))
        .await
        .context("Marking license Grace")?;
    Ok(())
}

/// Transitions a license from Grace to Expired. Guarded the same way as
/// [`mark_grace`].
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn mark_expired(db: &Database, id: &str) -> Result<(), LicenseError> {
    db.query("UPDATE licenses SET status = 'expired' WHERE id = $id AND status = 'grace'")
        .bind(("id", id.to_owned()))
        .await
        .context("Marking license Expired")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_usages_storage_round_trips() {
        assert_eq!(MaxUsages::unlimited().to_storage(), -1);
        assert_eq!(MaxUsages::from_storage(-1), MaxUsages::unlimited());
        assert_eq!(MaxUsages::limited(5).to_storage(), 5);
        assert_eq!(MaxUsages::from_storage(5), MaxUsages::limited(5));
    }

    #[test]
    fn max_usages_allows_respects_the_cap() {
        assert!(MaxUsages::limited(2).allows(1));
        assert!(!MaxUsages::limited(2).allows(2));
        assert!(MaxUsages::unlimited().allows(1_000_000));
    }

    #[test]
    fn policy_override_then_default_lookup_order() {
        let defaults = LicensingConfig::default();
        let mut policy = LicensePolicy::default();
        assert_eq!(policy.grace_days(&defaults), defaults.default_grace_days);

        policy.grace_days = Some(3);
        assert_eq!(policy.grace_days(&defaults), 3);

        assert_eq!(policy.over_limit_policy(&defaults), OverLimitPolicy::Reject);
        policy.over_limit_policy = Some("auto_replace_oldest".into());
        assert_eq!(policy.over_limit_policy(&defaults), OverLimitPolicy::AutoReplaceOldest);
    }

    #[test]
    fn force_online_after_disabled_when_zero() {
        let mut defaults = LicensingConfig::default();
        defaults.default_force_online_after_days = 0;
        let policy = LicensePolicy::default();
        let now = Utc::now();
        assert!(policy.force_online_after(&defaults, now).is_none());

        defaults.default_force_online_after_days = 3;
        let resolved = policy.force_online_after(&defaults, now).expect("enabled");
        assert_eq!(resolved, now + Duration::days(3));
    }

    #[test]
    fn is_usable_covers_active_and_grace_only() {
        let license = |status| License {
            id: "lic_1".into(),
            key_hash: [0u8; 32],
            status,
            owner_kind: "customer".into(),
            owner_id: "c1".into(),
            max_usages_raw: -1,
            activated_at: None,
            expires_at: None,
            scope: None,
            policy: LicensePolicy::default(),
            encrypted_key_copy: None,
            created_at: Utc::now(),
        };

        assert!(license(LicenseStatus::Active).is_usable());
        assert!(license(LicenseStatus::Grace).is_usable());
        assert!(!license(LicenseStatus::Pending).is_usable());
        assert!(!license(LicenseStatus::Suspended).is_usable());
    }
}
