//! Concurrency-safe seat registrar.
//!
//! `register` is the hard part of this crate: a License's active-usage
//! count must never exceed `max_usages` under arbitrary concurrent callers,
//! and a fingerprint must never be Active twice within its uniqueness
//! scope. `register` takes [`crate::lock`]'s exclusive per-license guard
//! before re-selecting the License row, so the whole
//! re-fetch/decide/mutate sequence runs as one critical section per
//! license id — no interleaved `register` call can observe and act on a
//! stale active-usage count.

use crate::error::{LicenseError, LicenseErrorExt};
use crate::license::{self, FingerprintUniqueness, License, OverLimitPolicy};
use crate::lock;
use chrono::{DateTime, Utc};
use mhub_audit::{AuditContext, AuditableRef};
use mhub_database::Database;
use mhub_domain::config::LicensingConfig;
use mhub_kernel::safe_nanoid;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Usage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Active,
    Revoked,
}

/// A registered seat: one fingerprint consuming one slot of a license's
/// capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub id: String,
    pub license_id: String,
    pub fingerprint: String,
    pub status: UsageStatus,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub client_type: Option<String>,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub meta: serde_json::Value,
}

/// Caller-supplied descriptive metadata for a registration, kept separate
/// from `fingerprint`: the core neither computes nor interprets client
/// identity, it only stores what it is handed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    pub client_type: Option<String>,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub meta: serde_json::Value,
}

/// Outcome of a successful [`register`] call — whether a new seat was
/// created or an existing Active match was returned as a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    Heartbeat,
}

async fn find_active_in_license(
    db: &Database,
    license_id: &str,
    fingerprint: &str,
) -> Result<Option<Usage>, LicenseError> {
    db.query(
        "SELECT * FROM license_usages \
         WHERE license_id = $license_id AND fingerprint = $fingerprint AND status = 'active' \
         LIMIT 1",
    )
    .bind(("license_id", license_id.to_owned()))
    .bind(("fingerprint", fingerprint.to_owned()))
    .await
    .context("Querying usage by fingerprint within license")?
    .take(0)
    .context("Parsing usage by fingerprint within license")
}

async fn find_active_anywhere(
    db: &Database,
    fingerprint: &str,
) -> Result<Option<Usage>, LicenseError> {
    db.query("SELECT * FROM license_usages WHERE fingerprint = $fingerprint AND status = 'active' LIMIT 1")
        .bind(("fingerprint", fingerprint.to_owned()))
        .await
        .context("Querying usage by fingerprint globally")?
        .take(0)
        .context("Parsing usage by fingerprint globally")
}

/// Finds the usage relevant to `fingerprint` under the license's own
/// uniqueness scope (per-license search, or global search if the license's
/// policy says `global`).
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_by_fingerprint(
    db: &Database,
    defaults: &LicensingConfig,
    license: &License,
    fingerprint: &str,
) -> Result<Option<Usage>, LicenseError> {
    match license.policy.fingerprint_uniqueness(defaults) {
        FingerprintUniqueness::PerLicense => find_active_in_license(db, &license.id, fingerprint).await,
        FingerprintUniqueness::Global => find_active_anywhere(db, fingerprint).await,
    }
}

async fn active_count(db: &Database, license_id: &str) -> Result<u32, LicenseError> {
    #[derive(Deserialize)]
    struct Count {
        count: i64,
    }

    let rows: Vec<Count> = db
        .query(
            "SELECT count() AS count FROM license_usages \
             WHERE license_id = $license_id AND status = 'active' GROUP ALL",
        )
        .bind(("license_id", license_id.to_owned()))
        .await
        .context("Counting active usages")?
        .take(0)
        .context("Parsing active usage count")?;

    Ok(rows.first().map_or(0, |row| u32::try_from(row.count).unwrap_or(u32::MAX)))
}

async fn oldest_active(db: &Database, license_id: &str) -> Result<Option<Usage>, LicenseError> {
    db.query(
        "SELECT * FROM license_usages \
         WHERE license_id = $license_id AND status = 'active' \
         ORDER BY last_seen_at ASC LIMIT 1",
    )
    .bind(("license_id", license_id.to_owned()))
    .await
    .context("Finding oldest active usage")?
    .take(0)
    .context("Parsing oldest active usage")
}

async fn revoke_row(
    db: &Database,
    usage: &Usage,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<Usage, LicenseError> {
    let mut meta = usage.meta.clone();
    if let serde_json::Value::Object(map) = &mut meta {
        map.insert("revoked_reason".to_owned(), serde_json::Value::String(reason.to_owned()));
    }

    db.query("UPDATE license_usages SET status = 'revoked', revoked_at = $at, meta = $meta WHERE id = $id")
        .bind(("id", usage.id.clone()))
        .bind(("at", at))
        .bind(("meta", meta.clone()))
        .await
        .context("Revoking usage")?;

    Ok(Usage { status: UsageStatus::Revoked, revoked_at: Some(at), meta, ..usage.clone() })
}

/// Registers a fingerprint against a license: re-fetch under lock,
/// idempotent heartbeat on an existing match, global-uniqueness conflict,
/// capacity/over-limit policy, usability guard, then insert.
///
/// The whole body runs under [`crate::lock::acquire`]'s per-license guard,
/// so a `LimitReached` failure's audit write happens before any other
/// `register` call for this license can start deciding on a newer
/// snapshot.
///
/// # Errors
/// - [`LicenseError::FingerprintInUseGlobally`] if `fingerprint` is Active
///   under a different license and uniqueness is `global`.
/// - [`LicenseError::LimitReached`] if capacity is exhausted and the policy
///   is `reject`.
/// - [`LicenseError::LicenseNotUsable`] if the license is not Active/Grace.
pub async fn register(
    db: &Database,
    defaults: &LicensingConfig,
    license: &License,
    fingerprint: &str,
    metadata: UsageMetadata,
    audit: &AuditContext,
    now: DateTime<Utc>,
) -> Result<(Usage, RegisterOutcome), LicenseError> {
    let _guard = lock::acquire("license", &license.id).await;

    // Re-fetch under the lock: `license` as handed in by the caller may be
    // stale by the time this task acquires the guard.
    let license = &license::find_by_id(db, &license.id).await?.ok_or_else(|| {
        LicenseError::LicenseNotFound {
            message: format!("no license with id {}", license.id).into(),
            context: Some("Registering usage".into()),
        }
    })?;

    let uniqueness = license.policy.fingerprint_uniqueness(defaults);

    if let Some(existing) = find_active_in_license(db, &license.id, fingerprint).await? {
        db.query("UPDATE license_usages SET last_seen_at = $now WHERE id = $id")
            .bind(("id", existing.id.clone()))
            .bind(("now", now))
            .await
            .context("Recording heartbeat on existing usage")?;

        tracing::debug!(license_id = %license.id, usage_id = %existing.id, "usage heartbeat");
        return Ok((Usage { last_seen_at: now, ..existing }, RegisterOutcome::Heartbeat));
    }

    if uniqueness == FingerprintUniqueness::Global {
        if let Some(elsewhere) = find_active_anywhere(db, fingerprint).await? {
            if elsewhere.license_id != license.id {
                return Err(LicenseError::FingerprintInUseGlobally {
                    message: format!("fingerprint is active under license {}", elsewhere.license_id)
                        .into(),
                    context: Some(format!("Registering usage on license {}", license.id).into()),
                });
            }
        }
    }

    let max_usages = license.max_usages();
    let current = active_count(db, &license.id).await?;

    if !max_usages.allows(current) {
        match license.policy.over_limit_policy(defaults) {
            OverLimitPolicy::Reject => {
                audit
                    .record(
                        db,
                        "UsageLimitReached",
                        AuditableRef { kind: "license".into(), id: license.id.clone() },
                        serde_json::json!({"fingerprint": fingerprint, "active_count": current}),
                        now,
                    )
                    .await
                    .context("Recording UsageLimitReached audit entry")?;

                return Err(LicenseError::LimitReached {
                    message: format!("license {} has {current} active usages", license.id).into(),
                    context: Some("Registering usage".into()),
                });
            }
            OverLimitPolicy::AutoReplaceOldest => {
                if let Some(oldest) = oldest_active(db, &license.id).await? {
                    revoke_row(db, &oldest, "auto_replaced", now).await?;
                    tracing::info!(
                        license_id = %license.id,
                        replaced = %oldest.id,
                        "auto-replaced oldest usage to admit new fingerprint"
                    );
                }
            }
        }
    }

    if !license.is_usable() {
        return Err(LicenseError::LicenseNotUsable {
            message: format!("license {} is not Active or Grace", license.id).into(),
            context: Some("Registering usage".into()),
        });
    }

    let usage = Usage {
        id: format!("usg_{}", safe_nanoid!()),
        license_id: license.id.clone(),
        fingerprint: fingerprint.to_owned(),
        status: UsageStatus::Active,
        registered_at: now,
        last_seen_at: now,
        revoked_at: None,
        client_type: metadata.client_type,
        name: metadata.name,
        ip: metadata.ip,
        user_agent: metadata.user_agent,
        meta: metadata.meta,
    };

    let _: Option<Usage> = db
        .query("CREATE license_usages CONTENT $usage")
        .bind(("usage", usage.clone()))
        .await
        .context("Persisting new usage")?
        .take(0)
        .context("Parsing created usage")?;

    audit
        .record(
            db,
            "UsageRegistered",
            AuditableRef { kind: "license".into(), id: license.id.clone() },
            serde_json::json!({"usage_id": usage.id, "fingerprint": fingerprint}),
            now,
        )
        .await
        .context("Recording UsageRegistered audit entry")?;

    tracing::info!(license_id = %license.id, usage_id = %usage.id, "usage registered");
    Ok((usage, RegisterOutcome::Registered))
}

/// Read-only preflight: would [`register`] succeed for `fingerprint` right
/// now, without mutating anything?
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn can_register(
    db: &Database,
    defaults: &LicensingConfig,
    license: &License,
    fingerprint: &str,
) -> Result<bool, LicenseError> {
    if find_active_in_license(db, &license.id, fingerprint).await?.is_some() {
        return Ok(true);
    }

    if license.policy.fingerprint_uniqueness(defaults) == FingerprintUniqueness::Global {
        if let Some(elsewhere) = find_active_anywhere(db, fingerprint).await? {
            if elsewhere.license_id != license.id {
                return Ok(false);
            }
        }
    }

    if !license.is_usable() {
        return Ok(false);
    }

    let current = active_count(db, &license.id).await?;
    if license.max_usages().allows(current) {
        return Ok(true);
    }

    Ok(license.policy.over_limit_policy(defaults) == OverLimitPolicy::AutoReplaceOldest)
}

/// Refreshes `last_seen_at` on an Active usage.
///
/// # Errors
/// Returns [`LicenseError::RevokedUsage`] if the usage is not Active.
pub async fn heartbeat(db: &Database, usage_id: &str, now: DateTime<Utc>) -> Result<Usage, LicenseError> {
    let existing = find_by_id(db, usage_id).await?.ok_or_else(|| LicenseError::LicenseNotFound {
        message: format!("no usage with id {usage_id}").into(),
        context: Some("Heartbeat".into()),
    })?;

    if existing.status != UsageStatus::Active {
        return Err(LicenseError::RevokedUsage {
            message: format!("usage {usage_id} is not Active").into(),
            context: Some("Heartbeat".into()),
        });
    }

    db.query("UPDATE license_usages SET last_seen_at = $now WHERE id = $id")
        .bind(("id", usage_id.to_owned()))
        .bind(("now", now))
        .await
        .context("Recording heartbeat")?;

    Ok(Usage { last_seen_at: now, ..existing })
}

/// Revokes a usage, idempotently. `reason` is stashed in `meta` alongside
/// `revoked_at`.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if `usage_id` does not exist.
pub async fn revoke(
    db: &Database,
    usage_id: &str,
    reason: &str,
    audit: &AuditContext,
    now: DateTime<Utc>,
) -> Result<Usage, LicenseError> {
    let existing = find_by_id(db, usage_id).await?.ok_or_else(|| LicenseError::LicenseNotFound {
        message: format!("no usage with id {usage_id}").into(),
        context: Some("Revoking usage".into()),
    })?;

    if existing.status == UsageStatus::Revoked {
        return Ok(existing);
    }

    let revoked = revoke_row(db, &existing, reason, now).await?;

    audit
        .record(
            db,
            "UsageRevoked",
            AuditableRef { kind: "usage".into(), id: usage_id.to_owned() },
            serde_json::json!({"license_id": revoked.license_id, "reason": reason}),
            now,
        )
        .await
        .context("Recording UsageRevoked audit entry")?;

    tracing::info!(usage_id, reason, "usage revoked");
    Ok(revoked)
}

/// Looks up a usage by its internal id.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_by_id(db: &Database, usage_id: &str) -> Result<Option<Usage>, LicenseError> {
    db.query("SELECT * FROM license_usages WHERE id = $id LIMIT 1")
        .bind(("id", usage_id.to_owned()))
        .await
        .context("Querying usage by id")?
        .take(0)
        .context("Parsing usage by id")
}

/// All Active usages for a license, for sweeps and mass-revocation.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_active_for_license(db: &Database, license_id: &str) -> Result<Vec<Usage>, LicenseError> {
    db.query("SELECT * FROM license_usages WHERE license_id = $license_id AND status = 'active' ORDER BY id")
        .bind(("license_id", license_id.to_owned()))
        .await
        .context("Querying active usages for license")?
        .take(0)
        .context("Parsing active usages for license")
}

/// Active usages past `last_seen_at + days`, for the inactivity sweep.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_inactive_since(
    db: &Database,
    license_id: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Usage>, LicenseError> {
    db.query(
        "SELECT * FROM license_usages \
         WHERE license_id = $license_id AND status = 'active' AND last_seen_at < $cutoff \
         ORDER BY id",
    )
    .bind(("license_id", license_id.to_owned()))
    .bind(("cutoff", cutoff))
    .await
    .context("Querying inactive usages")?
    .take(0)
    .context("Parsing inactive usages")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::{LicensePolicy, LicenseStatus, MaxUsages};

    fn license_with(max_usages: MaxUsages, policy: LicensePolicy) -> License {
        License {
            id: "lic_test".into(),
            key_hash: [0u8; 32],
            status: LicenseStatus::Active,
            owner_kind: "customer".into(),
            owner_id: "c1".into(),
            max_usages_raw: max_usages.to_storage(),
            activated_at: Some(Utc::now()),
            expires_at: None,
            scope: None,
            policy,
            encrypted_key_copy: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn register_outcome_distinguishes_heartbeat_from_new() {
        assert_ne!(RegisterOutcome::Registered, RegisterOutcome::Heartbeat);
    }

    #[test]
    fn license_with_helper_reflects_max_usages() {
        let license = license_with(MaxUsages::limited(2), LicensePolicy::default());
        assert_eq!(license.max_usages(), MaxUsages::limited(2));
        assert!(license.is_usable());
    }
}
