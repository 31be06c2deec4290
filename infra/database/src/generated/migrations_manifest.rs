//! Auto-generated by `cargo xtask codegen migrations`.
//! Do not edit by hand.

use crate::migrations::{Migration, Permissions};

#[must_use]
pub(crate) fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            "sys.database",
            "Database",
            Some("Database infrastructure layer providing SurrealDB integration"),
            "0000-bootstrap",
            include_str!("../../../../infra/database/migrations/0000-bootstrap.surql"),
            "6e681f71637aed18f8cf621f13d9cd3d72685008789b432b9e1f6c3174fd7f55",
            true,
        ),
        Migration::new(
            "audit",
            "Audit",
            Some("Audit feature slice"),
            "0000-audit-log",
            include_str!("../../../../crates/features/audit/migrations/0000-audit-log.surql"),
            "65ae37b8893efbf96af809391e003a4640d4522024cb0c9be323410ebda8022f",
            false,
        ),
        Migration::new(
            "licensing",
            "Licensing",
            Some("Licensing authority: key hierarchy, offline tokens, seat accounting, audit trail"),
            "0000-licensing-schema",
            include_str!("../../../../crates/features/licensing/migrations/0000-licensing-schema.surql"),
            "5596549a4c3bbc29676931a56761bbc9b86da828c1ed909b67958d91c66f60ba",
            false,
        ),
    ]
}

#[must_use]
pub(crate) fn builtin_registry() -> Vec<Permissions> {
    vec![
        Permissions::new(
            "audit",
            vec![
                "trail",
            ]),
        Permissions::new(
            "licensing",
            vec![
                "license_scopes",
                "licenses",
                "licensing_keys",
            ]),
        Permissions::new(
            "sys.database",
            vec![
                "engine",
            ]),
    ]
}
