//! Append-only persistence for the audit trail: `record`, range queries,
//! hash-chain verification, and retention purge.
//!
//! `record` reads the current tail, computes `previous_hash` from it, and
//! inserts — three steps against one shared, globally-ordered sequence
//! (`id`, and the hash chain itself) that every caller in the process
//! competes for, regardless of which aggregate (license, scope, usage)
//! they're recording about. Unlike `mhub_licensing::lock`, which only
//! serializes callers touching the *same* license or scope, the audit
//! chain has no per-aggregate partition to exploit: any two concurrent
//! `record` calls anywhere in the process would otherwise race on the same
//! tail read. [`RECORD_LOCK`] serializes the whole read-decide-write
//! sequence process-wide.

use crate::entry::{self, AuditEntry, AuditableRef, EventKind};
use crate::error::{AuditError, AuditErrorExt};
use chrono::{DateTime, Utc};
use mhub_database::Database;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock serializing [`record`]'s tail-read/id-compute/insert
/// sequence. One audit trail, one sequence — there is no aggregate key to
/// shard this by the way `mhub_licensing::lock` shards license/scope locks.
static RECORD_LOCK: LazyLock<AsyncMutex<()>> = LazyLock::new(|| AsyncMutex::new(()));

#[derive(Deserialize)]
struct StoredRow {
    id: u64,
    event_kind: EventKind,
    auditable: AuditableRef,
    actor: Option<String>,
    meta: serde_json::Value,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    previous_hash: Option<[u8; 32]>,
}

impl From<StoredRow> for AuditEntry {
    fn from(row: StoredRow) -> Self {
        AuditEntry {
            id: row.id,
            event_kind: row.event_kind,
            auditable: row.auditable,
            actor: row.actor,
            meta: row.meta,
            occurred_at: row.occurred_at,
            previous_hash: row.previous_hash,
        }
    }
}

async fn tail(db: &Database) -> Result<Option<AuditEntry>, AuditError> {
    let rows: Vec<StoredRow> = db
        .query(
            "SELECT id, event_kind, auditable, actor, meta, occurred_at, previous_hash \
             FROM licensing_audit_logs ORDER BY id DESC LIMIT 1",
        )
        .await
        .context("Querying audit log tail")?
        .take(0)
        .context("Parsing audit log tail")?;

    Ok(rows.into_iter().next().map(AuditEntry::from))
}

async fn next_id(db: &Database) -> Result<u64, AuditError> {
    #[derive(Deserialize)]
    struct MaxId {
        id: u64,
    }

    let rows: Vec<MaxId> = db
        .query("SELECT id FROM licensing_audit_logs ORDER BY id DESC LIMIT 1")
        .await
        .context("Querying audit log max id")?
        .take(0)
        .context("Parsing audit log max id")?;

    Ok(rows.first().map_or(1, |row| row.id + 1))
}

/// Appends one entry to the audit trail. When `hash_chain_enabled`, the new
/// entry's `previous_hash` is set to the `SHA-256` of the current tail
/// entry's canonical encoding (or `None` if the log is empty).
///
/// Holds [`RECORD_LOCK`] for its whole body, so two concurrent `record`
/// calls anywhere in the process — even about unrelated aggregates — never
/// observe the same tail and never mint the same `id`.
///
/// # Errors
/// Returns [`AuditError::Database`] on storage failure.
pub async fn record(
    db: &Database,
    event_kind: impl Into<EventKind>,
    auditable: AuditableRef,
    actor: Option<String>,
    meta: serde_json::Value,
    hash_chain_enabled: bool,
    now: DateTime<Utc>,
) -> Result<AuditEntry, AuditError> {
    let _guard = RECORD_LOCK.lock().await;

    let previous_hash =
        if hash_chain_enabled { tail(db).await?.map(|prev| entry::hash_entry(&prev)) } else { None };

    let entry = AuditEntry {
        id: next_id(db).await?,
        event_kind: event_kind.into(),
        auditable,
        actor,
        meta,
        occurred_at: now,
        previous_hash,
    };

    #[derive(serde::Serialize)]
    struct Row<'a> {
        id: u64,
        event_kind: &'a str,
        auditable: &'a AuditableRef,
        actor: &'a Option<String>,
        meta: &'a serde_json::Value,
        occurred_at: DateTime<Utc>,
        previous_hash: Option<[u8; 32]>,
    }

    let row = Row {
        id: entry.id,
        event_kind: &entry.event_kind.0,
        auditable: &entry.auditable,
        actor: &entry.actor,
        meta: &entry.meta,
        occurred_at: entry.occurred_at,
        previous_hash: entry.previous_hash,
    };

    let _: Option<serde_json::Value> = db
        .query("CREATE licensing_audit_logs CONTENT $row")
        .bind(("row", row))
        .await
        .context("Persisting audit entry")?
        .take(0)
        .context("Parsing persisted audit entry")?;

    tracing::info!(id = entry.id, event_kind = %entry.event_kind, "audit entry recorded");
    Ok(entry)
}

/// Fetches entries in `[from_id, to_id]` inclusive, ascending by id — the
/// input to [`verify_chain`] and to any audit-trail viewer.
///
/// # Errors
/// Returns [`AuditError::Database`] on storage failure.
pub async fn range(db: &Database, from_id: u64, to_id: u64) -> Result<Vec<AuditEntry>, AuditError> {
    let rows: Vec<StoredRow> = db
        .query(
            "SELECT id, event_kind, auditable, actor, meta, occurred_at, previous_hash \
             FROM licensing_audit_logs WHERE id >= $from AND id <= $to ORDER BY id ASC",
        )
        .bind(("from", from_id))
        .bind(("to", to_id))
        .await
        .context("Querying audit entry range")?
        .take(0)
        .context("Parsing audit entry range")?;

    Ok(rows.into_iter().map(AuditEntry::from).collect())
}

/// Recomputes each entry's hash in `[from_id, to_id]` and compares it to
/// the next entry's `previous_hash`.
///
/// # Errors
/// Returns [`AuditError::ChainBroken`] naming the first entry whose link
/// does not match, or [`AuditError::Database`] on storage failure.
pub async fn verify_chain(db: &Database, from_id: u64, to_id: u64) -> Result<(), AuditError> {
    let entries = range(db, from_id, to_id).await?;

    if let Some(broken_at) = entry::first_broken_link(&entries) {
        return Err(AuditError::ChainBroken {
            message: format!("entry {broken_at} does not link to its predecessor").into(),
            context: Some(format!("Verifying chain [{from_id}, {to_id}]").into()),
        });
    }

    Ok(())
}

/// Carries the two pieces of ambient state every audited write needs so
/// callers elsewhere in the workspace don't have to thread them through
/// individually: who to blame an entry on, and whether hash-chaining is
/// turned on for this deployment.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub actor: Option<String>,
    pub hash_chain_enabled: bool,
}

impl AuditContext {
    #[must_use]
    pub fn new(actor: Option<String>, hash_chain_enabled: bool) -> Self {
        Self { actor, hash_chain_enabled }
    }

    #[must_use]
    pub fn system(hash_chain_enabled: bool) -> Self {
        Self { actor: Some("system".to_owned()), hash_chain_enabled }
    }

    /// Convenience wrapper over [`record`] that fills `actor` and
    /// `hash_chain_enabled` from this context.
    ///
    /// # Errors
    /// Returns [`AuditError::Database`] on storage failure.
    pub async fn record(
        &self,
        db: &Database,
        event_kind: impl Into<EventKind>,
        auditable: AuditableRef,
        meta: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, AuditError> {
        record(db, event_kind, auditable, self.actor.clone(), meta, self.hash_chain_enabled, now).await
    }
}

/// Bulk-purges entries older than `cutoff` — the only sanctioned way to
/// remove audit entries, since individual rows are immutable and
/// undeletable once written. Returns the number of rows removed.
///
/// # Errors
/// Returns [`AuditError::Database`] on storage failure.
pub async fn purge(db: &Database, cutoff: DateTime<Utc>) -> Result<u64, AuditError> {
    let deleted: Vec<serde_json::Value> = db
        .query("DELETE licensing_audit_logs WHERE occurred_at < $cutoff RETURN BEFORE")
        .bind(("cutoff", cutoff))
        .await
        .context("Purging audit entries")?
        .take(0)
        .context("Parsing purge result")?;

    let count = u64::try_from(deleted.len()).unwrap_or(u64::MAX);
    tracing::info!(count, %cutoff, "audit entries purged by retention cutoff");
    Ok(count)
}
