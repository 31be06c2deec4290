use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

/// Top-level API configuration shared across services.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfigInner {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub licensing: LicensingConfig,
    pub audit: AuditConfig,
}

/// Thin Arc-wrapped config for inexpensive cloning into subsystems.
#[derive(Default, Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(flatten, default)]
    inner: Arc<ApiConfigInner>,
}

impl Deref for ApiConfig {
    type Target = ApiConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ApiConfig {
    fn deref_mut(&mut self) -> &mut ApiConfigInner {
        Arc::make_mut(&mut self.inner)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub ssl: Option<SslConfig>,
}

/// TLS certificate/key paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// `SurrealDB` connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<DatabaseCredentials>,
}

/// `SurrealDB` root credentials (optional when using unauthenticated engines like mem://).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
}

/// Process-wide defaults for the licensing authority.
///
/// Per-license policy overrides (grace days, over-limit policy, etc.) live
/// on the `License` row itself; these are the fallbacks used when a license
/// does not override them (see `mhub_licensing::license::LicensePolicy`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicensingConfig {
    /// Name of the environment variable that supplies the private-key
    /// encryption passphrase (`spec`'s `LICENSING_KEY_PASSPHRASE`).
    pub passphrase_env: String,
    /// `iss` claim written into issued tokens, unless overridden per call.
    pub issuer: String,
    /// Default number of days a license remains usable after `expires_at`.
    pub default_grace_days: u32,
    /// Default token time-to-live, in days.
    pub default_token_ttl_days: u32,
    /// Default tolerance, in seconds, for `nbf`/`iat` future-dating.
    pub default_clock_skew_seconds: u32,
    /// Default rotation interval for scoped signing keys, in days. Zero
    /// disables automatic rotation.
    pub default_key_rotation_days: u32,
    /// Default signing-key validity window, in days, from issuance.
    pub default_signing_key_validity_days: u32,
    /// Default action when a registration would exceed `max_usages`:
    /// `"reject"` or `"auto_replace_oldest"`.
    pub default_over_limit_policy: String,
    /// Default fingerprint-uniqueness scope: `"per_license"` or `"global"`.
    pub default_fingerprint_uniqueness: String,
    /// Default number of days after issuance past which a token requires an
    /// online check-in. Zero disables the check.
    pub default_force_online_after_days: u32,
    /// Interval, in seconds, between background sweep passes (expiration,
    /// inactivity revocation, scope rotation) run by the server. Zero
    /// disables the background loop; an external scheduler (cron, a
    /// separate job runner) may still invoke the same sweeps directly.
    pub sweep_interval_seconds: u32,
}

/// Process-wide defaults for the audit trail.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether newly recorded entries carry `previous_hash`, linking them
    /// into the hash chain. Disabling this is a deployment choice, not a
    /// per-entry one — it does not retroactively affect existing entries.
    pub hash_chain_enabled: bool,
    /// Entries older than this many days become eligible for the retention
    /// purge. Zero disables automatic purging.
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { hash_chain_enabled: true, retention_days: 0 }
    }
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            passphrase_env: "LICENSING_KEY_PASSPHRASE".to_owned(),
            issuer: "musterhub-licensing".to_owned(),
            default_grace_days: 14,
            default_token_ttl_days: 7,
            default_clock_skew_seconds: 60,
            default_key_rotation_days: 90,
            default_signing_key_validity_days: 120,
            default_over_limit_policy: "reject".to_owned(),
            default_fingerprint_uniqueness: "per_license".to_owned(),
            default_force_online_after_days: 3,
            sweep_interval_seconds: 300,
        }
    }
}

// --- Default ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 4583, ssl: None }
    }
}

impl Default for SslConfig {
    fn default() -> Self {
        Self { cert: PathBuf::from("cert.pem"), key: PathBuf::from("key.pem") }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mem://".to_owned(),
            namespace: "mhub".to_owned(),
            database: "core".to_owned(),
            credentials: Some(DatabaseCredentials::default()),
        }
    }
}

impl Default for DatabaseCredentials {
    fn default() -> Self {
        Self { username: "root".to_owned(), password: "root".to_owned() }
    }
}


