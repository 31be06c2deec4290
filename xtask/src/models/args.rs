//! # CLI Argument Definitions
//!
//! This module defines the command-line interface (CLI) structure using the `clap` crate.
//! It specifies the available subcommands, arguments, and flags for the application.

use clap::{Parser, Subcommand};

/// The main CLI structure parsing command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "cargo xtask")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Developer toolkit for the MusterHub workspace")]
pub struct Cli {
    /// The main subcommand to execute.
    #[command(subcommand)]
    pub command: AppCommands,
}

/// Enumeration of available application subcommands.
#[derive(Debug, Subcommand)]
pub enum AppCommands {
    /// Install the necessary tools and dependencies for development
    Setup {},
    /// Manage workspace Features
    Features {
        #[command(subcommand)]
        action: FeatureAction,
    },
    /// Manage workspace Infrastructure
    Libs {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Manage workspace Applications
    Apps {
        #[command(subcommand)]
        action: AppAction,
    },
    /// Manage local development infrastructure
    Dev {
        #[command(subcommand)]
        action: DevAction,
    },
    /// Generate code artifacts
    #[command(alias = "migrations")]
    Codegen {
        #[command(subcommand)]
        action: CodegenAction,
    },
    /// Run tests (workspace by default)
    Test {
        /// Run tests for a specific crate (auto-prefixes with 'mhub-' if missing)
        project: Option<String>,
    },
    /// Run doc tests (workspace by default)
    Doctest {
        /// Run doc tests for a specific crate (auto-prefixes with 'mhub-' if missing)
        project: Option<String>,
    },
    /// Run a project
    Run {
        /// Run a specific crate (auto-prefixes with 'mhub-' if missing)
        project: String,
    },
    /// Run benches for a project
    Bench {
        /// Run benches for a specific crate (auto-prefixes with 'mhub-' if missing)
        project: String,
    },
    /// Run a project with profiling (requires unstable tokio)
    Profiling {
        #[arg(short, long)]
        project: String,
    },
    /// Manage the licensing key hierarchy (root key, scoped signing keys)
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Issue offline license tokens directly against the store
    Offline {
        #[command(subcommand)]
        action: OfflineAction,
    },
}

/// Enumeration of `keys:*` subcommands (spec §6).
#[derive(Debug, Subcommand)]
pub enum KeysAction {
    /// Create the root key, failing if one is already active unless `--force`
    MakeRoot {
        /// Revoke the existing active root (reason: "superseded") and replace it
        #[arg(long)]
        force: bool,
        /// Validity window in days (0 = no expiry)
        #[arg(long, default_value_t = 0)]
        days: u32,
    },
    /// Issue a new signing key (and its certificate) under a scope, or global if omitted
    IssueSigning {
        /// Scope slug; omit for a global signing key
        #[arg(long)]
        scope: Option<String>,
        /// RFC 3339 not-before timestamp (defaults to now)
        #[arg(long)]
        nbf: Option<String>,
        /// RFC 3339 expiry timestamp (overrides `--days` if given)
        #[arg(long)]
        exp: Option<String>,
        /// Validity window in days from `--nbf`, ignored if `--exp` is given (0 = no expiry)
        #[arg(long, default_value_t = 120)]
        days: u32,
    },
    /// Rotate a scope's signing key: revoke the active one(s), issue a fresh one
    Rotate {
        /// Scope slug to rotate
        #[arg(long)]
        scope: String,
        /// Rotation reason: "routine" or "compromised"
        #[arg(long, default_value = "routine")]
        reason: String,
    },
    /// Revoke a key by kid
    Revoke {
        /// kid of the key to revoke
        kid: String,
        /// Revocation reason
        #[arg(long)]
        reason: Option<String>,
        /// RFC 3339 timestamp to record as the revocation time (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// List every key with its status and scope
    List {},
    /// Export the public-key bundle
    Export {
        /// Scope slug to include signing keys from, in addition to global
        #[arg(long)]
        scope: Option<String>,
        /// Output format: "json" (bundle shape) or "jwks"
        #[arg(long, default_value = "json")]
        format: String,
        /// Include each signing key's certificate chain
        #[arg(long)]
        include_chain: bool,
    },
}

/// Enumeration of `offline:*` subcommands (spec §6).
#[derive(Debug, Subcommand)]
pub enum OfflineAction {
    /// Register a usage and issue a token for it without going through the API
    Issue {
        /// License id
        #[arg(long)]
        license: String,
        /// Device/installation fingerprint to register
        #[arg(long)]
        fingerprint: String,
        /// Token time-to-live, in days
        #[arg(long, default_value_t = 30)]
        ttl: u32,
    },
}

#[derive(Debug, Subcommand)]
pub enum FeatureAction {
    /// Create a new feature in the crates/ directory
    Add {
        /// The name of the feature (will be prefixed with 'mhub-')
        name: String,
    },
    /// List all features in the crates/ directory with their descriptions
    List {},
}

#[derive(Debug, Subcommand)]
pub enum LibraryAction {
    /// Create a new library in the infra/ directory
    Add {
        /// The name of the library (will be prefixed with 'mhub-')
        name: String,
    },
    /// List all libraries in the infra/ directory with their descriptions
    List {},
}

#[derive(Debug, Subcommand)]
pub enum AppAction {
    /// Create a new application in the apps/ directory
    Add {
        /// The name of the application (will be prefixed with 'mhub-')
        name: String,
    },
    /// List all applications in the apps/ directory with their descriptions
    List {},
}

/// Enumeration of available development subcommands.
#[derive(Debug, Subcommand)]
pub enum DevAction {
    /// Start `SurrealDB` and other services
    Up {},
    /// Stop all services
    Down {
        /// Also remove volumes (wipes the database)
        #[arg(short, long)]
        volumes: bool,
    },
    /// Follow logs from services
    Logs {
        /// Specific service name (e.g., 'surrealdb')
        service: Option<String>,
    },
}

/// Enumeration of codegen commands.
#[derive(Debug, Subcommand)]
pub enum CodegenAction {
    /// Generate a hardcoded migration manifest
    Migrations {},
}
