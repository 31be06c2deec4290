//! # Audit trail
//!
//! Tamper-evident, append-only event log shared by the licensing authority
//! (and any other slice that needs one): every state-changing operation
//! elsewhere in the workspace records an [`entry::AuditEntry`] here, right
//! after the mutation it describes commits. [`log::record`] serializes its
//! own tail-read/id-compute/insert sequence process-wide (see
//! `log::RECORD_LOCK`), so the hash chain stays intact under concurrent
//! callers even when those callers are recording about unrelated
//! aggregates.
//!
//! Module map:
//! - [`entry`] — the entry shape and its hash-chain canonicalization, free
//!   of any storage dependency.
//! - [`log`] — persistence: `record`, range queries, chain verification,
//!   retention purge.

pub mod entry;
mod error;
#[cfg(feature = "server")]
pub mod log;

pub use crate::entry::{AuditEntry, AuditableRef, EventKind};
pub use crate::error::{AuditError, AuditErrorExt};
#[cfg(feature = "server")]
pub use crate::log::AuditContext;

#[cfg(feature = "server")]
use mhub_domain::config::ApiConfig;
#[cfg(feature = "server")]
use mhub_kernel::domain::registry::InitializedSlice;

/// Audit feature state: holds the deployment's hash-chaining toggle, read
/// by every [`log::record`] call so the decision lives in one place rather
/// than being threaded through every caller.
#[mhub_derive::mhub_slice]
pub struct Audit {
    pub hash_chain_enabled: bool,
}

/// Initialize the audit feature.
///
/// # Errors
/// This never fails today; it returns a `Result` to match the other
/// slices and to leave room for future startup validation.
#[cfg(feature = "server")]
pub fn init(config: &ApiConfig) -> Result<InitializedSlice, AuditError> {
    let hash_chain_enabled = config.audit.hash_chain_enabled;

    let slice = Audit::new(AuditInner { hash_chain_enabled });
    tracing::info!(hash_chain_enabled, "Audit slice initialized");
    Ok(InitializedSlice::new(slice))
}
