#![warn(rust_2018_idioms, unused_lifetimes)]
#![allow(
    clippy::print_stderr,
    clippy::print_stdout,
    clippy::disallowed_methods,
    clippy::disallowed_types
)]

pub mod handlers;
pub mod models;
pub mod services;

use crate::handlers::{apps, bench, codegen, dev, features, keys, libs, profiling, run, setup, testing};
use crate::models::args::{
    AppAction, AppCommands, Cli, CodegenAction, FeatureAction, KeysAction, LibraryAction,
    OfflineAction,
};

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        AppCommands::Setup {} => setup::setup_project()?,
        AppCommands::Features { action } => match action {
            FeatureAction::Add { name } => features::create_feature(&name)?,
            FeatureAction::List {} => features::list_crates()?,
        },
        AppCommands::Libs { action } => match action {
            LibraryAction::Add { name } => libs::create_lib(&name)?,
            LibraryAction::List {} => libs::list_libs()?,
        },
        AppCommands::Apps { action } => match action {
            AppAction::Add { name } => apps::create_app(&name)?,
            AppAction::List {} => apps::list_apps()?,
        },
        AppCommands::Dev { action } => dev::handle_dev_command(action)?,
        AppCommands::Codegen { action } => match action {
            CodegenAction::Migrations {} => codegen::codegen_migrations()?,
        },
        AppCommands::Test { project } => testing::run_tests(project.as_deref())?,
        AppCommands::Doctest { project } => testing::run_doctests(project.as_deref())?,
        AppCommands::Run { project } => run::run_project(&project)?,
        AppCommands::Bench { project } => bench::run_bench(&project)?,
        AppCommands::Profiling { project } => profiling::run_profiling(&project)?,
        AppCommands::Keys { action } => match action {
            KeysAction::MakeRoot { force, days } => keys::make_root(force, days)?,
            KeysAction::IssueSigning { scope, nbf, exp, days } => {
                keys::issue_signing(scope, nbf, exp, days)?;
            },
            KeysAction::Rotate { scope, reason } => keys::rotate(scope, reason)?,
            KeysAction::Revoke { kid, reason, at } => keys::revoke(kid, reason, at)?,
            KeysAction::List {} => keys::list()?,
            KeysAction::Export { scope, format, include_chain } => {
                keys::export(scope, format, include_chain)?;
            },
        },
        AppCommands::Offline { action } => match action {
            OfflineAction::Issue { license, fingerprint, ttl } => {
                keys::offline_issue(license, fingerprint, ttl)?;
            },
        },
    }

    Ok(())
}
