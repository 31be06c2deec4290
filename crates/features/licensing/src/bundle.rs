//! Public-key bundle exporter: the client-consumable JSON document carrying
//! the active root and every active signing key for a scope (or globally),
//! letting clients verify offline tokens without ever contacting the
//! server.

use crate::ca::{CertificateEnvelope, RootDescriptor};
use crate::error::{LicenseError, LicenseErrorExt};
use crate::keystore::{self, KeyStatus, KeyType};
use chrono::{DateTime, Utc};
use mhub_database::Database;
use serde::{Deserialize, Serialize};

/// The root entry in the exported bundle, spelled out with the literal
/// field names the wire format uses (unlike the rest of this crate's
/// internal rows, which follow the workspace's `camelCase` convention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRoot {
    pub kid: String,
    #[serde(with = "crate::bytes_as_base64_fixed")]
    pub public_key: [u8; 32],
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<&RootDescriptor> for BundleRoot {
    fn from(root: &RootDescriptor) -> Self {
        Self {
            kid: root.kid.clone(),
            public_key: root.public_key,
            valid_from: root.valid_from,
            valid_until: root.valid_until,
        }
    }
}

/// One signing key entry in the exported bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyEntry {
    pub kid: String,
    #[serde(with = "crate::bytes_as_base64_fixed")]
    pub public_key: [u8; 32],
    pub certificate: CertificateEnvelope,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// The exported public-key bundle: everything a client needs to verify
/// offline tokens independently. Field names here are the literal wire
/// contract; they are not renamed to the workspace's usual `camelCase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyBundle {
    pub root: BundleRoot,
    pub signing: Vec<SigningKeyEntry>,
    pub issued_at: DateTime<Utc>,
}

/// Builds the bundle for `scope` (active signing keys bound to it) plus the
/// global (unscoped) active signing keys, alongside the single active root.
///
/// # Errors
/// Returns [`LicenseError::NoActiveSigningKey`] if there is no Active root
/// key to export, or [`LicenseError::Database`] on storage failure.
pub async fn export(db: &Database, scope: Option<&str>, now: DateTime<Utc>) -> Result<PublicKeyBundle, LicenseError> {
    let root = keystore::find_active_root(db).await?.ok_or_else(|| LicenseError::NoActiveSigningKey {
        message: "no active root key to export".into(),
        context: Some("Exporting public-key bundle".into()),
    })?;

    let mut signing_keys = find_active_signing_for_export(db, None).await?;
    if let Some(scope) = scope {
        signing_keys.extend(find_active_signing_for_export(db, Some(scope)).await?);
    }

    let entries = signing_keys
        .into_iter()
        .filter_map(|key| {
            let certificate = key.certificate.clone()?;
            Some(SigningKeyEntry {
                kid: key.kid,
                public_key: key.public_key,
                certificate,
                valid_from: key.valid_from,
                valid_until: key.valid_until,
            })
        })
        .collect();

    let root_descriptor = RootDescriptor::from(&root);
    Ok(PublicKeyBundle { root: BundleRoot::from(&root_descriptor), signing: entries, issued_at: now })
}

async fn find_active_signing_for_export(
    db: &Database,
    scope: Option<&str>,
) -> Result<Vec<keystore::LicensingKey>, LicenseError> {
    let keys: Vec<keystore::LicensingKey> = match scope {
        Some(scope) => db
            .query(
                "SELECT * FROM licensing_keys \
                 WHERE key_type = 'signing' AND status = 'active' AND scope = $scope",
            )
            .bind(("scope", scope.to_owned()))
            .await
            .context("Querying scoped signing keys for export")?
            .take(0)
            .context("Parsing scoped signing keys for export")?,
        None => db
            .query("SELECT * FROM licensing_keys WHERE key_type = 'signing' AND status = 'active' AND scope = NONE")
            .await
            .context("Querying global signing keys for export")?
            .take(0)
            .context("Parsing global signing keys for export")?,
    };

    Ok(keys
        .into_iter()
        .filter(|key| key.key_type == KeyType::Signing && key.status == KeyStatus::Active)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_serializes_with_the_literal_wire_field_names() {
        let bundle = PublicKeyBundle {
            root: BundleRoot {
                kid: "kid_root".into(),
                public_key: [1u8; 32],
                valid_from: Utc::now(),
                valid_until: None,
            },
            signing: Vec::new(),
            issued_at: Utc::now(),
        };

        let json = serde_json::to_value(&bundle).expect("serializes");
        assert!(json.get("root").is_some());
        assert!(json.get("signing").is_some());
        assert!(json.get("issued_at").is_some());
        assert!(json["root"].get("public_key").is_some());
        assert!(json["root"].get("valid_from").is_some());
    }
}
