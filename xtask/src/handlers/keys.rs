//! `keys:*` and `offline:issue` CLI surface (spec §6): the developer-facing
//! wrapper around `mhub_licensing`'s key hierarchy and token issuance, for
//! use against the same store a deployed server would run against.
//!
//! Exit codes follow the contract documented for each command; this module
//! is the only place in `xtask` that calls `std::process::exit` directly,
//! since the codes are part of the CLI's external contract, not an internal
//! convenience.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use mhub_audit::AuditContext;
use mhub_database::Database;
use mhub_domain::config::ApiConfig;
use mhub_kernel::config::load_config;
use mhub_licensing::keystore::{self, KeyType, PassphraseCache};
use mhub_licensing::{ca, scope, token, usage};
use serde_json::json;

/// Connects to the same store a deployed server would, using `server.toml`
/// (plus `MHUB__...` environment overrides) — the same config source
/// `apps/server` bootstraps from.
async fn connect() -> Result<(Database, ApiConfig)> {
    let config: ApiConfig =
        load_config(Some("server")).context("Loading server configuration")?;

    let db_cfg = &config.database;
    let mut builder =
        Database::builder().url(&db_cfg.url).session(&db_cfg.namespace, &db_cfg.database);
    if let Some(creds) = &db_cfg.credentials {
        builder = builder.auth(&creds.username, &creds.password);
    }
    let db = builder.init().await.context("Connecting to the licensing store")?;

    Ok((db, config))
}

/// Loads the key-store passphrase cache from the configured environment
/// binding (`LICENSING_KEY_PASSPHRASE` by default).
fn passphrase_cache(config: &ApiConfig) -> PassphraseCache {
    let cache = PassphraseCache::new();
    if let Ok(passphrase) = std::env::var(&config.licensing.passphrase_env) {
        if !passphrase.is_empty() {
            cache.set(passphrase);
        }
    }
    cache
}

fn audit_context(config: &ApiConfig) -> AuditContext {
    AuditContext::system(config.audit.hash_chain_enabled)
}

fn exit_with(code: i32, message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {message}");
    std::process::exit(code);
}

fn rt() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Building the xtask async runtime")
}

/// `keys:make-root [--force]` — exit 0 success, 1 exists-without-force,
/// 3 missing passphrase.
pub fn make_root(force: bool, days: u32) -> Result<()> {
    rt()?.block_on(async {
        let (db, config) = connect().await?;
        let cache = passphrase_cache(&config);
        if cache.get().is_none() {
            exit_with(3, format!("passphrase not set in {}", config.licensing.passphrase_env));
        }

        if let Some(existing) = keystore::find_active_root(&db).await? {
            if !force {
                exit_with(1, format!("an active root key already exists ({})", existing.kid));
            }
            let now = Utc::now();
            keystore::revoke(&db, &existing.kid, "superseded", now).await?;
            audit_context(&config)
                .record(
                    &db,
                    "KeyRevoked",
                    mhub_audit::AuditableRef { kind: "licensing_key".into(), id: existing.kid },
                    json!({"reason": "superseded"}),
                    now,
                )
                .await?;
        }

        let now = Utc::now();
        let valid_until = (days > 0).then(|| now + Duration::days(i64::from(days)));
        let key = keystore::create(&db, &cache, KeyType::Root, None, now, valid_until).await?;

        audit_context(&config)
            .record(
                &db,
                "KeyRootCreated",
                mhub_audit::AuditableRef { kind: "licensing_key".into(), id: key.kid.clone() },
                json!({}),
                now,
            )
            .await?;

        println!("✅ root key created: {}", key.kid);
        anyhow::Ok(())
    })
}

/// `keys:issue-signing [--scope --nbf --exp --days]` — exit 0, 1 bad
/// `--nbf`/`--exp`, 2 scope not found, 3 crypto error (no active root).
pub fn issue_signing(
    scope_slug: Option<String>,
    nbf: Option<String>,
    exp: Option<String>,
    days: u32,
) -> Result<()> {
    let parse_rfc3339 = |raw: &str, flag: &str| -> DateTime<Utc> {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(err) => exit_with(1, format!("invalid {flag} {raw:?}: {err}")),
        }
    };

    rt()?.block_on(async {
        let (db, config) = connect().await?;
        let cache = passphrase_cache(&config);

        if let Some(slug) = &scope_slug {
            if scope::find_by_slug(&db, slug).await?.is_none() {
                exit_with(2, format!("scope {slug} does not exist"));
            }
        }

        let occurred_at = Utc::now();
        let valid_from = nbf.as_deref().map_or(occurred_at, |raw| parse_rfc3339(raw, "--nbf"));
        let valid_until = match exp.as_deref() {
            Some(raw) => Some(parse_rfc3339(raw, "--exp")),
            None => (days > 0).then(|| valid_from + Duration::days(i64::from(days))),
        };

        let key = match keystore::create(
            &db,
            &cache,
            KeyType::Signing,
            scope_slug.as_deref(),
            valid_from,
            valid_until,
        )
        .await
        {
            Ok(key) => key,
            Err(err) => exit_with(3, err),
        };

        let certificate = match ca::issue_signing_certificate(
            &db,
            &cache,
            key.public_key,
            &key.kid,
            valid_from,
            valid_until,
            scope_slug.as_deref(),
        )
        .await
        {
            Ok(cert) => cert,
            Err(err) => exit_with(3, err),
        };
        keystore::attach_certificate(&db, &key.kid, certificate).await?;

        audit_context(&config)
            .record(
                &db,
                "KeySigningIssued",
                mhub_audit::AuditableRef { kind: "licensing_key".into(), id: key.kid.clone() },
                json!({"scope": scope_slug}),
                occurred_at,
            )
            .await?;

        println!("✅ signing key issued: {} (scope: {})", key.kid, scope_slug.as_deref().unwrap_or("global"));
        anyhow::Ok(())
    })
}

/// `keys:rotate [--reason routine|compromised]` — exit 0, 1 bad reason,
/// 2 missing root, 3 crypto error.
pub fn rotate(scope_slug: String, reason: String) -> Result<()> {
    if reason != "routine" && reason != "compromised" {
        exit_with(1, format!("reason must be 'routine' or 'compromised', got {reason:?}"));
    }

    rt()?.block_on(async {
        let (db, config) = connect().await?;
        let cache = passphrase_cache(&config);

        if keystore::find_active_root(&db).await?.is_none() {
            exit_with(2, "no active root key; run keys:make-root first");
        }

        let audit = audit_context(&config);
        let now = Utc::now();
        let validity_days = config.licensing.default_signing_key_validity_days;

        match scope::rotate_keys(&db, &cache, &scope_slug, &reason, validity_days, &audit, now).await {
            Ok(key) => {
                println!("✅ scope {scope_slug} rotated; new signing key {}", key.kid);
                anyhow::Ok(())
            }
            Err(err) => exit_with(3, err),
        }
    })
}

/// `keys:revoke {kid} [--reason --at]` — exit 0, 2 not found.
pub fn revoke(kid: String, reason: Option<String>, at: Option<String>) -> Result<()> {
    rt()?.block_on(async {
        let (db, config) = connect().await?;

        if keystore::find_by_kid(&db, &kid).await?.is_none() {
            exit_with(2, format!("no key with kid {kid}"));
        }

        let at = match at {
            Some(raw) => {
                DateTime::parse_from_rfc3339(&raw).context("Parsing --at as RFC 3339")?.with_timezone(&Utc)
            }
            None => Utc::now(),
        };
        let reason = reason.unwrap_or_else(|| "manual".to_owned());

        let key = keystore::revoke(&db, &kid, &reason, at).await?;
        audit_context(&config)
            .record(
                &db,
                "KeyRevoked",
                mhub_audit::AuditableRef { kind: "licensing_key".into(), id: key.kid.clone() },
                json!({"reason": reason}),
                at,
            )
            .await?;

        println!("✅ key {kid} revoked (reason: {reason})");
        anyhow::Ok(())
    })
}

/// `keys:list` — lists every key with its status and scope.
pub fn list() -> Result<()> {
    rt()?.block_on(async {
        let (db, _config) = connect().await?;

        let keys: Vec<keystore::LicensingKey> = db
            .query("SELECT * FROM licensing_keys ORDER BY key_type, valid_from")
            .await
            .context("Listing licensing keys")?
            .take(0)
            .context("Parsing licensing keys")?;

        if keys.is_empty() {
            println!("(no keys)");
            return anyhow::Ok(());
        }

        for key in keys {
            println!(
                "{:<9} {:<9} {:<9} scope={:<12} valid_from={} valid_until={}",
                key.kid,
                format!("{:?}", key.key_type),
                format!("{:?}", key.status),
                key.scope.as_deref().unwrap_or("global"),
                key.valid_from.to_rfc3339(),
                key.valid_until.map(|v| v.to_rfc3339()).unwrap_or_else(|| "never".into()),
            );
        }
        anyhow::Ok(())
    })
}

/// `keys:export [--scope --format json|jwks --include-chain]`.
pub fn export(scope_slug: Option<String>, format: String, include_chain: bool) -> Result<()> {
    rt()?.block_on(async {
        let (db, _config) = connect().await?;
        let now = Utc::now();

        let bundle = mhub_licensing::bundle::export(&db, scope_slug.as_deref(), now).await?;

        match format.as_str() {
            "jwks" => {
                let keys: Vec<_> = bundle
                    .signing
                    .iter()
                    .map(|entry| {
                        use base64::Engine as _;
                        let mut jwk = json!({
                            "kty": "OKP",
                            "crv": "Ed25519",
                            "kid": entry.kid,
                            "x": base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(entry.public_key),
                        });
                        if include_chain {
                            jwk["certificate"] = serde_json::to_value(&entry.certificate).unwrap_or_default();
                        }
                        jwk
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({"keys": keys}))?);
            }
            _ => {
                if include_chain {
                    println!("{}", serde_json::to_string_pretty(&bundle)?);
                } else {
                    let mut trimmed = serde_json::to_value(&bundle)?;
                    if let Some(signing) = trimmed.get_mut("signing").and_then(|v| v.as_array_mut()) {
                        for entry in signing {
                            if let Some(obj) = entry.as_object_mut() {
                                obj.remove("certificate");
                            }
                        }
                    }
                    println!("{}", serde_json::to_string_pretty(&trimmed)?);
                }
            }
        }
        anyhow::Ok(())
    })
}

/// `offline:issue --license --fingerprint --ttl <N>d` — exit 0, 2 not
/// found, 3 crypto/revoked.
pub fn offline_issue(license_id: String, fingerprint: String, ttl_days: u32) -> Result<()> {
    rt()?.block_on(async {
        let (db, config) = connect().await?;
        let cache = passphrase_cache(&config);
        let audit = audit_context(&config);
        let now = Utc::now();

        let Some(license) = mhub_licensing::license::find_by_id(&db, &license_id).await? else {
            exit_with(2, format!("no license with id {license_id}"));
        };

        let (usage, _outcome) = match usage::register(
            &db,
            &config.licensing,
            &license,
            &fingerprint,
            usage::UsageMetadata::default(),
            &audit,
            now,
        )
        .await
        {
            Ok(result) => result,
            Err(err) => exit_with(3, err),
        };

        let ttl = Duration::days(i64::from(ttl_days));
        match token::issue_with_ttl(&db, &cache, &config.licensing, &license, &usage, ttl, now).await {
            Ok(tok) => {
                println!("{tok}");
                anyhow::Ok(())
            }
            Err(err) => exit_with(3, err),
        }
    })
}
