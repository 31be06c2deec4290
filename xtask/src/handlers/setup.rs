use anyhow::{Context, Result};
use std::process::Command;

/// Tools required for development
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("cargo-generate", "cargo-generate"),
    ("cargo-audit", "cargo-audit"),
    ("nextest", "cargo-nextest"),
    ("tokio-console", "tokio-console"),
];

/// Set up the development environment for `MusterHub`.
///
/// # Result
/// Returns `Ok(())` after installing required tools.
///
/// # Errors
/// Returns an error if tool installation fails.
pub fn setup_project() -> Result<()> {
    install_dependencies()?;
    Ok(())
}

fn install_dependencies() -> Result<()> {
    println!("🛠️  Starting MusterHub development setup...");

    for (bin, package) in REQUIRED_TOOLS {
        if is_tool_installed(bin) {
            println!("✅ {bin} is already installed. Trying update...");
        } else {
            println!("📥 Installing {package}...");
        }
        run_command("cargo", &["install", package, "--locked"])?;
    }

    println!("\n✨ Setup complete! You are ready to develop for MusterHub.");
    Ok(())
}

fn is_tool_installed(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn run_command(cmd: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("Failed to execute {cmd}"))?;

    if !status.success() {
        anyhow::bail!("Command '{cmd} {args:?}' failed with status {status}");
    }
    Ok(())
}
