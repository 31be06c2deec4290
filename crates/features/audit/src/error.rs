use std::borrow::Cow;

/// Audit slice error type.
///
/// The core never swallows a failure here: `record` either commits its
/// entry (and, when hash-chaining is enabled, its link to the previous
/// entry) or returns one of these and leaves the log untouched.
#[mhub_derive::mhub_error]
pub enum AuditError {
    /// The hash chain is broken: an entry's `previous_hash` does not match
    /// the recomputed hash of the entry that precedes it.
    #[error("Audit hash chain is broken{}: {message}", format_context(.context))]
    ChainBroken { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// An attempt was made to mutate an existing audit row. The storage
    /// layer disallows this; this variant exists so callers that try
    /// anyway get a typed error instead of a silent no-op.
    #[error("Audit entries are immutable{}: {message}", format_context(.context))]
    Immutable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Audit storage error{}: {source}", format_context(.context))]
    Database { source: mhub_database::DatabaseError, context: Option<Cow<'static, str>> },

    #[error("Audit serialization error{}: {source}", format_context(.context))]
    Serde { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Audit error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
