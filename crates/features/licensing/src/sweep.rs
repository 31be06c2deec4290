//! Background sweeps: expiration, inactivity revocation, and scope
//! rotation. Each is a pure function of `(now, &Database)`, idempotent
//! under reruns, meant to be invoked by an external scheduler (a
//! `tokio::time::interval` loop in `apps/server`, a cron job, whatever the
//! deployment wires up) — the core ships none of its own.
//!
//! Entities are processed in monotonic id order. Each step is either a
//! `WHERE status = <previous>`-guarded transition (safe to rerun, and safe
//! against a concurrent transition landing first) or a capacity-decreasing
//! usage revoke, so no sweep step can violate the `active_count ≤
//! max_usages` invariant that [`crate::usage::register`] enforces under
//! [`crate::lock`]'s per-license guard; scope rotation
//! ([`run_scope_rotation_sweep`]) delegates to [`crate::scope::rotate_keys`],
//! which takes that same lock keyed by scope slug.

use crate::error::{LicenseError, LicenseErrorExt};
use crate::keystore::PassphraseCache;
use crate::license::{self, LicenseStatus};
use crate::scope;
use crate::usage;
use chrono::{DateTime, Utc};
use mhub_audit::{AuditContext, AuditableRef};
use mhub_database::Database;
use mhub_domain::config::LicensingConfig;

/// Outcome counters for one sweep pass, surfaced for logging/metrics by the
/// caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationReport {
    pub transitioned_to_grace: u32,
    pub transitioned_to_expired: u32,
    pub usages_revoked_on_expiry: u32,
}

/// Active → Grace on passed `expires_at`; Grace → Expired once the
/// (possibly license-overridden) grace window has elapsed, revoking all of
/// that license's Active usages on the Expired transition.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure. A failure
/// partway through leaves already-processed licenses in their new state;
/// rerunning the sweep is safe since every transition query is itself
/// idempotent (guarded by a `WHERE status = <previous>` clause).
pub async fn run_expiration_sweep(
    db: &Database,
    config: &LicensingConfig,
    audit: &AuditContext,
    now: DateTime<Utc>,
) -> Result<ExpirationReport, LicenseError> {
    let mut report = ExpirationReport::default();

    for expiring in license::find_expiring(db, now).await? {
        license::mark_grace(db, &expiring.id).await?;
        report.transitioned_to_grace += 1;

        audit
            .record(
                db,
                "LicenseExpired",
                AuditableRef { kind: "license".into(), id: expiring.id.clone() },
                serde_json::json!({"expired_at": expiring.expires_at}),
                now,
            )
            .await
            .context("Recording LicenseExpired audit entry")?;

        tracing::info!(license_id = %expiring.id, "license expired into grace");
    }

    for in_grace in license::find_in_grace(db).await? {
        if !in_grace.in_grace_expired(config, now) {
            continue;
        }

        license::mark_expired(db, &in_grace.id).await?;
        report.transitioned_to_expired += 1;

        for active_usage in usage::find_active_for_license(db, &in_grace.id).await? {
            usage::revoke(db, &active_usage.id, "license_expired", audit, now).await?;
            report.usages_revoked_on_expiry += 1;
        }

        tracing::info!(license_id = %in_grace.id, "license transitioned grace to expired");
    }

    Ok(report)
}

/// Revokes Active usages whose license sets
/// `inactivity_auto_revoke_days = D` and `last_seen_at + D < now`.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn run_inactivity_sweep(
    db: &Database,
    audit: &AuditContext,
    now: DateTime<Utc>,
) -> Result<u32, LicenseError> {
    let mut revoked = 0u32;

    for candidate_license in find_licenses_with_inactivity_policy(db).await? {
        let Some(days) = candidate_license.policy.inactivity_auto_revoke_days() else {
            continue;
        };
        if days == 0 {
            continue;
        }

        let cutoff = now - chrono::Duration::days(i64::from(days));
        for stale in usage::find_inactive_since(db, &candidate_license.id, cutoff).await? {
            usage::revoke(db, &stale.id, "inactivity", audit, now).await?;
            revoked += 1;
            tracing::info!(
                license_id = %candidate_license.id,
                usage_id = %stale.id,
                "usage revoked for inactivity"
            );
        }
    }

    Ok(revoked)
}

async fn find_licenses_with_inactivity_policy(
    db: &Database,
) -> Result<Vec<license::License>, LicenseError> {
    db.query(
        "SELECT * FROM licenses \
         WHERE status IN ['active', 'grace'] AND policy.inactivity_auto_revoke_days != NONE \
         ORDER BY id",
    )
    .await
    .context("Querying licenses with an inactivity policy")?
    .take(0)
    .context("Parsing licenses with an inactivity policy")
}

/// Rotates every scope whose schedule says it `needs_rotation`.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure, or a
/// keystore/crypto error while rotating any one scope (subsequent scopes
/// are still attempted in a best-effort pass by the caller if desired; this
/// function stops at the first failure to keep the report accurate).
pub async fn run_scope_rotation_sweep(
    db: &Database,
    cache: &PassphraseCache,
    config: &LicensingConfig,
    audit: &AuditContext,
    now: DateTime<Utc>,
) -> Result<u32, LicenseError> {
    let mut rotated = 0u32;

    for due in scope::find_needing_rotation(db, now).await? {
        scope::rotate_keys(
            db,
            cache,
            &due.slug,
            "routine",
            config.default_signing_key_validity_days,
            audit,
            now,
        )
        .await?;
        rotated += 1;
    }

    Ok(rotated)
}

/// Whether a license's status would currently read as usable, recomputed
/// straight from its stored fields — a read-only helper for sweeps and
/// diagnostics that want to double check before acting, independent of
/// whatever the `status` column currently says.
#[must_use]
pub fn recompute_status(
    status: LicenseStatus,
    expires_at: Option<DateTime<Utc>>,
    grace_days: u32,
    now: DateTime<Utc>,
) -> LicenseStatus {
    match status {
        LicenseStatus::Active => match expires_at {
            Some(exp) if exp < now => LicenseStatus::Grace,
            _ => LicenseStatus::Active,
        },
        LicenseStatus::Grace => match expires_at {
            Some(exp) if exp + chrono::Duration::days(i64::from(grace_days)) < now => {
                LicenseStatus::Expired
            }
            _ => LicenseStatus::Grace,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn recompute_status_active_to_grace_at_expiry() {
        let now = Utc::now();
        let status = recompute_status(LicenseStatus::Active, Some(now - Duration::seconds(1)), 14, now);
        assert_eq!(status, LicenseStatus::Grace);
    }

    #[test]
    fn recompute_status_grace_to_expired_after_window() {
        let now = Utc::now();
        let expires_at = Some(now - Duration::days(15));
        let status = recompute_status(LicenseStatus::Grace, expires_at, 14, now);
        assert_eq!(status, LicenseStatus::Expired);
    }

    #[test]
    fn recompute_status_grace_holds_within_window() {
        let now = Utc::now();
        let expires_at = Some(now - Duration::days(1));
        let status = recompute_status(LicenseStatus::Grace, expires_at, 14, now);
        assert_eq!(status, LicenseStatus::Grace);
    }

    #[test]
    fn recompute_status_leaves_terminal_states_alone() {
        let now = Utc::now();
        assert_eq!(recompute_status(LicenseStatus::Cancelled, None, 14, now), LicenseStatus::Cancelled);
    }
}
