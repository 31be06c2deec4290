//! Shared string constants: OpenAPI tag names and entity-kind tags used in
//! polymorphic `(kind, id)` references.

/// OpenAPI tag for system-level endpoints (health, readiness).
pub const SYSTEM_TAG: &str = "system";

/// OpenAPI tag for licensing endpoints.
pub const LICENSING_TAG: &str = "licensing";

/// `owner_kind` / `auditable_kind` tag for a license entity.
pub const LICENSE: &str = "license";

/// `owner_kind` / `auditable_kind` tag for a license usage (seat) entity.
pub const LICENSE_USAGE: &str = "license_usage";

/// `auditable_kind` tag for a licensing key entity.
pub const LICENSING_KEY: &str = "licensing_key";

/// `auditable_kind` tag for a license scope entity.
pub const LICENSE_SCOPE: &str = "license_scope";

/// Slug of the distinguished fallback scope used when a license or key has
/// no explicit scope.
pub const GLOBAL_SCOPE: &str = "global";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_non_empty_and_distinct() {
        let tags = [SYSTEM_TAG, LICENSING_TAG, LICENSE, LICENSE_USAGE, LICENSING_KEY, LICENSE_SCOPE];
        assert!(tags.iter().all(|t| !t.is_empty()));

        let mut sorted = tags.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), tags.len());
    }
}
