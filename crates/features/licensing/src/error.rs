use std::borrow::Cow;

/// Error types for the licensing authority.
///
/// Every fallible operation in this crate returns one of these variants. The
/// core never swallows a failure: a mutation either commits fully or returns
/// one of these and leaves state unchanged.
#[mhub_derive::mhub_error]
pub enum LicenseError {
    /// A license key failed hash verification.
    #[error("License key is invalid{}", format_context(.context))]
    InvalidKey { context: Option<Cow<'static, str>> },

    /// No license matches the given identity (`uid` or key hash).
    #[error("License not found{}: {message}", format_context(.context))]
    LicenseNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Requested operation requires `Active` or `Grace`, license is in another state.
    #[error("License is not usable in its current state{}: {message}", format_context(.context))]
    LicenseNotUsable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The seat registrar would exceed `max_usages` under a `reject` over-limit policy.
    #[error("License usage limit reached{}: {message}", format_context(.context))]
    LimitReached { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Fingerprint is Active under a different license and uniqueness is `global`.
    #[error("Fingerprint already registered under another license{}: {message}", format_context(.context))]
    FingerprintInUseGlobally { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// `heartbeat` or similar called against a usage that is no longer Active.
    #[error("Usage has been revoked{}: {message}", format_context(.context))]
    RevokedUsage { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Token issuance found no Active signing key for the requested scope or globally.
    #[error("No active signing key available{}: {message}", format_context(.context))]
    NoActiveSigningKey { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Token verification resolved a signing key that is no longer Active.
    #[error("Signing key has been revoked{}: {message}", format_context(.context))]
    SigningKeyRevoked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Ed25519 signature verification failed.
    #[error("Token signature is invalid{}: {source}", format_context(.context))]
    BadSignature { source: ed25519_dalek::SignatureError, context: Option<Cow<'static, str>> },

    /// Token carries a `force_online_after` instant that has passed.
    #[error("Client must contact the server to refresh this token{}: {message}", format_context(.context))]
    OnlineCheckRequired { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No passphrase is available to decrypt a private key.
    #[error("Keystore passphrase is not configured{}: {message}", format_context(.context))]
    KeystorePassphraseMissing { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A certificate envelope failed canonicalization or signature checks.
    #[error("Certificate is invalid{}: {message}", format_context(.context))]
    CertificateInvalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Token is structurally malformed (wrong version tag, bad base64url, truncated parts).
    #[error("Token is malformed{}: {message}", format_context(.context))]
    MalformedToken { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Database access failed.
    #[error("Licensing storage error{}: {source}", format_context(.context))]
    Database { source: mhub_database::DatabaseError, context: Option<Cow<'static, str>> },

    /// Writing to the audit trail failed.
    #[error("Audit trail write failed{}: {source}", format_context(.context))]
    Audit { source: mhub_audit::AuditError, context: Option<Cow<'static, str>> },

    /// Vault (AEAD) operation failed.
    #[error("Licensing cryptographic storage error{}: {source}", format_context(.context))]
    Vault { source: mhub_vault::VaultError, context: Option<Cow<'static, str>> },

    /// JSON (de)serialization failed.
    #[error("Serialization error{}: {source}", format_context(.context))]
    Serde { source: serde_json::Error, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal licensing error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
