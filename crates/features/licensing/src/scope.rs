//! Scope metadata: the namespace grouping licenses and signing keys that
//! belong to one software product, plus the rotation trigger that drives
//! scoped key lifecycle.

use crate::ca;
use crate::error::{LicenseError, LicenseErrorExt};
use crate::keystore::{self, KeyType, LicensingKey, PassphraseCache};
use crate::lock;
use chrono::{DateTime, Duration, Utc};
use mhub_audit::{AuditContext, AuditableRef};
use mhub_database::Database;
use serde::{Deserialize, Serialize};

/// The distinguished fallback scope every workspace carries on-demand.
pub const GLOBAL_SLUG: &str = "global";

/// A scope: defaults for licenses created under it, and the rotation
/// schedule for its signing keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub slug: String,
    pub name: String,
    pub active: bool,
    pub default_max_usages: i64,
    pub default_duration_days: Option<u32>,
    pub default_grace_days: Option<u32>,
    pub key_rotation_days: u32,
    pub next_rotation_at: Option<DateTime<Utc>>,
    pub last_rotation_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Scope {
    /// `key_rotation_days > 0 ∧ (next_rotation_at is null ∨ next_rotation_at ≤ now)`.
    #[must_use]
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.key_rotation_days > 0
            && self.next_rotation_at.is_none_or(|next| next <= now)
    }
}

/// Creates a scope, idempotently: if `slug` already exists, its current row
/// is returned unchanged.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn create(
    db: &Database,
    slug: &str,
    name: &str,
    key_rotation_days: u32,
    now: DateTime<Utc>,
) -> Result<Scope, LicenseError> {
    if let Some(existing) = find_by_slug(db, slug).await? {
        return Ok(existing);
    }

    let scope = Scope {
        slug: slug.to_owned(),
        name: name.to_owned(),
        active: true,
        default_max_usages: -1,
        default_duration_days: None,
        default_grace_days: None,
        key_rotation_days,
        next_rotation_at: (key_rotation_days > 0)
            .then(|| now + Duration::days(i64::from(key_rotation_days))),
        last_rotation_at: None,
        created_at: now,
    };

    let _: Option<Scope> = db
        .query("CREATE license_scopes CONTENT $scope")
        .bind(("scope", scope.clone()))
        .await
        .context("Persisting new scope")?
        .take(0)
        .context("Parsing created scope")?;

    tracing::info!(slug, "scope created");
    Ok(scope)
}

/// Ensures the distinguished `global` scope exists, creating it on demand.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn ensure_global(db: &Database, now: DateTime<Utc>) -> Result<Scope, LicenseError> {
    create(db, GLOBAL_SLUG, "Global", 0, now).await
}

/// Looks up a scope by its slug.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_by_slug(db: &Database, slug: &str) -> Result<Option<Scope>, LicenseError> {
    db.query("SELECT * FROM license_scopes WHERE slug = $slug LIMIT 1")
        .bind(("slug", slug.to_owned()))
        .await
        .context("Querying scope by slug")?
        .take(0)
        .context("Parsing scope by slug")
}

async fn require(db: &Database, slug: &str) -> Result<Scope, LicenseError> {
    find_by_slug(db, slug).await?.ok_or_else(|| LicenseError::LicenseNotFound {
        message: format!("no scope with slug {slug}").into(),
        context: Some("Resolving scope".into()),
    })
}

/// Activates a scope, idempotently.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if `slug` does not exist.
pub async fn activate(db: &Database, slug: &str) -> Result<Scope, LicenseError> {
    let existing = require(db, slug).await?;
    if existing.active {
        return Ok(existing);
    }

    db.query("UPDATE license_scopes SET active = true WHERE slug = $slug")
        .bind(("slug", slug.to_owned()))
        .await
        .context("Activating scope")?;

    Ok(Scope { active: true, ..existing })
}

/// Deactivates a scope, idempotently. Inactive scopes do not rotate or
/// issue new signing keys.
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if `slug` does not exist.
pub async fn deactivate(db: &Database, slug: &str) -> Result<Scope, LicenseError> {
    let existing = require(db, slug).await?;
    if !existing.active {
        return Ok(existing);
    }

    db.query("UPDATE license_scopes SET active = false WHERE slug = $slug")
        .bind(("slug", slug.to_owned()))
        .await
        .context("Deactivating scope")?;

    Ok(Scope { active: false, ..existing })
}

/// Scopes due for rotation right now, oldest id first.
///
/// # Errors
/// Returns [`LicenseError::Database`] on storage failure.
pub async fn find_needing_rotation(db: &Database, now: DateTime<Utc>) -> Result<Vec<Scope>, LicenseError> {
    let scopes: Vec<Scope> = db
        .query("SELECT * FROM license_scopes WHERE active = true AND key_rotation_days > 0 ORDER BY slug")
        .await
        .context("Querying scopes")?
        .take(0)
        .context("Parsing scopes")?;

    Ok(scopes.into_iter().filter(|scope| scope.needs_rotation(now)).collect())
}

/// Rotates a scope's signing key: revokes every currently Active signing
/// key bound to this scope, generates a fresh one, issues its certificate,
/// and advances the rotation schedule.
///
/// `reason` is the revocation reason recorded against the superseded
/// key(s) — `"routine"` for scheduled rotation, `"compromised"` for an
/// emergency rotation (the caller is responsible for backdating
/// `revoked_at` separately when invalidating recently-issued tokens).
///
/// # Errors
/// Returns [`LicenseError::LicenseNotFound`] if the scope does not exist,
/// or a keystore/crypto error while generating the new key.
pub async fn rotate_keys(
    db: &Database,
    cache: &PassphraseCache,
    slug: &str,
    reason: &str,
    validity_days: u32,
    audit: &AuditContext,
    now: DateTime<Utc>,
) -> Result<LicensingKey, LicenseError> {
    let _guard = lock::acquire("scope", slug).await;

    let scope = require(db, slug).await?;

    let active_signing: Vec<LicensingKey> = db
        .query(
            "SELECT * FROM licensing_keys \
             WHERE key_type = 'signing' AND status = 'active' AND scope = $scope",
        )
        .bind(("scope", slug.to_owned()))
        .await
        .context("Querying active signing keys for rotation")?
        .take(0)
        .context("Parsing active signing keys for rotation")?;

    for key in &active_signing {
        keystore::revoke(db, &key.kid, reason, now).await?;

        audit
            .record(
                db,
                "KeyRotated",
                AuditableRef { kind: "licensing_key".into(), id: key.kid.clone() },
                serde_json::json!({"scope": slug, "reason": reason}),
                now,
            )
            .await
            .context("Recording KeyRotated audit entry")?;
    }

    let valid_until = (validity_days > 0).then(|| now + Duration::days(i64::from(validity_days)));
    let new_key = keystore::create(db, cache, KeyType::Signing, Some(slug), now, valid_until).await?;

    let certificate = ca::issue_signing_certificate(
        db,
        cache,
        new_key.public_key,
        &new_key.kid,
        now,
        valid_until,
        Some(slug),
    )
    .await?;
    keystore::attach_certificate(db, &new_key.kid, certificate.clone()).await?;

    db.query(
        "UPDATE license_scopes SET last_rotation_at = $now, \
         next_rotation_at = $next WHERE slug = $slug",
    )
    .bind(("slug", slug.to_owned()))
    .bind(("now", now))
    .bind(("next", now + Duration::days(i64::from(scope.key_rotation_days))))
    .await
    .context("Updating scope rotation schedule")?;

    audit
        .record(
            db,
            "KeySigningIssued",
            AuditableRef { kind: "licensing_key".into(), id: new_key.kid.clone() },
            serde_json::json!({"scope": slug}),
            now,
        )
        .await
        .context("Recording KeySigningIssued audit entry")?;

    tracing::info!(slug, new_kid = %new_key.kid, reason, "scope signing key rotated");
    Ok(LicensingKey { certificate: Some(certificate), ..new_key })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(key_rotation_days: u32, next_rotation_at: Option<DateTime<Utc>>, active: bool) -> Scope {
        Scope {
            slug: "acme".into(),
            name: "Acme".into(),
            active,
            default_max_usages: -1,
            default_duration_days: None,
            default_grace_days: None,
            key_rotation_days,
            next_rotation_at,
            last_rotation_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn needs_rotation_false_when_disabled() {
        assert!(!scope(0, None, true).needs_rotation(Utc::now()));
    }

    #[test]
    fn needs_rotation_true_on_first_run() {
        assert!(scope(30, None, true).needs_rotation(Utc::now()));
    }

    #[test]
    fn needs_rotation_respects_the_schedule() {
        let now = Utc::now();
        assert!(!scope(30, Some(now + Duration::days(1)), true).needs_rotation(now));
        assert!(scope(30, Some(now - Duration::seconds(1)), true).needs_rotation(now));
    }

    #[test]
    fn needs_rotation_false_when_inactive() {
        assert!(!scope(30, Some(Utc::now() - Duration::days(1)), false).needs_rotation(Utc::now()));
    }
}
