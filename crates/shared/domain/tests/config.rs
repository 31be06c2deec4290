use mhub_domain::config::{ApiConfig, DatabaseConfig, LicensingConfig, ServerConfig};
use serde_json::json;

#[test]
fn config_defaults_are_sane() {
    let server = ServerConfig::default();
    assert_eq!(server.port, 4583);
    assert!(server.ssl.is_none());

    let db = DatabaseConfig::default();
    assert_eq!(db.url, "mem://");
    assert_eq!(db.namespace, "mhub");
    assert_eq!(db.database, "core");
    assert!(db.credentials.is_some());
}

#[test]
fn api_config_deserializes() {
    let raw = json!({
        "server": { "address": "::", "port": 8080 },
        "database": { "url": "mem://", "namespace": "n", "database": "d", "credentials": null },
        "licensing": { "issuer": "acme-licensing" }
    });

    let cfg: ApiConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.database.namespace, "n");
    assert_eq!(cfg.licensing.issuer, "acme-licensing");
}

#[test]
fn licensing_defaults_cover_every_policy_knob() {
    let licensing = LicensingConfig::default();
    assert_eq!(licensing.default_over_limit_policy, "reject");
    assert_eq!(licensing.default_fingerprint_uniqueness, "per_license");
    assert_eq!(licensing.default_force_online_after_days, 3);
}
