//! The audit entry shape and its hash-chain canonicalization.
//!
//! Kept free of any storage dependency: everything here is a pure function
//! over values, so the chain-recomputation logic in [`verify_links`] and the
//! persistence logic in [`crate::log`] can be tested and reasoned about
//! independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of event an [`AuditEntry`] records. New kinds are added here as
/// the systems that emit them grow; this is intentionally a plain string
/// newtype rather than a closed enum so collaborators outside this crate
/// (license lifecycle, key rotation, usage registrar) can each own their
/// own event vocabulary without a central registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKind(pub String);

impl EventKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        Self(kind.to_owned())
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque polymorphic reference to whatever the entry is about — a
/// License, a LicensingKey, a Scope, whatever external callers want to
/// audit. The core never dereferences this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditableRef {
    pub kind: String,
    pub id: String,
}

/// One immutable row in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub event_kind: EventKind,
    pub auditable: AuditableRef,
    pub actor: Option<String>,
    pub meta: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub previous_hash: Option<[u8; 32]>,
}

/// The subset of an entry's fields that participate in the hash chain, in
/// the fixed order the chain's canonical encoding covers: `(id, event_kind,
/// auditable_ref, actor, meta, occurred_at)`. `previous_hash` itself is
/// excluded, since it is what the *next* entry's hash links to, not an
/// input to this entry's own hash.
fn canonical_bytes(entry: &AuditEntry) -> Vec<u8> {
    #[derive(Serialize)]
    struct Canonical<'a> {
        id: u64,
        event_kind: &'a str,
        auditable: &'a AuditableRef,
        actor: &'a Option<String>,
        meta: &'a serde_json::Value,
        occurred_at: DateTime<Utc>,
    }

    let canonical = Canonical {
        id: entry.id,
        event_kind: &entry.event_kind.0,
        auditable: &entry.auditable,
        actor: &entry.actor,
        meta: &entry.meta,
        occurred_at: entry.occurred_at,
    };

    // `serde_json` does not reorder map keys from a struct's declared
    // field order, so this is stable across runs and builds.
    serde_json::to_vec(&canonical).expect("audit entry fields always serialize")
}

/// `SHA-256` of an entry's canonical byte encoding — what the *next*
/// entry's `previous_hash` must equal.
#[must_use]
pub fn hash_entry(entry: &AuditEntry) -> [u8; 32] {
    Sha256::digest(canonical_bytes(entry)).into()
}

/// Recomputes every entry's hash in `entries` (assumed already sorted by
/// `id` ascending) and checks it against the next entry's `previous_hash`.
/// Returns the id of the first entry whose link does not match, if any.
#[must_use]
pub fn first_broken_link(entries: &[AuditEntry]) -> Option<u64> {
    for pair in entries.windows(2) {
        let [previous, next] = pair else { continue };
        let expected = hash_entry(previous);
        if next.previous_hash != Some(expected) {
            return Some(next.id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, previous_hash: Option<[u8; 32]>) -> AuditEntry {
        AuditEntry {
            id,
            event_kind: EventKind::new("test.event"),
            auditable: AuditableRef { kind: "license".into(), id: "lic_1".into() },
            actor: Some("system".into()),
            meta: serde_json::json!({"k": "v"}),
            occurred_at: "2025-01-01T00:00:00Z".parse().unwrap(),
            previous_hash,
        }
    }

    #[test]
    fn first_entry_has_no_previous_hash_by_convention() {
        let first = entry(1, None);
        assert!(first.previous_hash.is_none());
    }

    #[test]
    fn a_valid_chain_has_no_broken_link() {
        let first = entry(1, None);
        let second = entry(2, Some(hash_entry(&first)));
        let third = entry(3, Some(hash_entry(&second)));
        assert_eq!(first_broken_link(&[first, second, third]), None);
    }

    #[test]
    fn a_tampered_entry_breaks_the_chain() {
        let first = entry(1, None);
        let second = entry(2, Some(hash_entry(&first)));
        // third's previous_hash is computed against the original second,
        // before anyone tampers with it.
        let third = entry(3, Some(hash_entry(&second)));

        let mut tampered_second = second;
        tampered_second.meta = serde_json::json!({"k": "tampered"});

        assert_eq!(first_broken_link(&[first, tampered_second, third]), Some(3));
    }

    #[test]
    fn hash_is_deterministic() {
        let e = entry(1, None);
        assert_eq!(hash_entry(&e), hash_entry(&e));
    }
}
