//! Auto-generated by `cargo xtask codegen migrations`.
//! Do not edit by hand.

pub(crate) mod migrations_manifest;
