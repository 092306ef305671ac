//! Command implementations for leasehold.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the config resolution shared by all of them.

mod clear;
mod run;
mod status;

use crate::cli::{Command, StoreArgs};
use leasehold::config::Config;
use leasehold::error::Result;
use std::path::Path;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "leasehold.yaml";

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run::cmd_run(args),
        Command::Status(args) => status::cmd_status(args),
        Command::Clear(args) => clear::cmd_clear(args),
    }
}

/// Load the config named by `--config`, else `./leasehold.yaml` if present,
/// else defaults, then apply `--root`.
pub(crate) fn resolve_config(args: &StoreArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Config::load(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    if let Some(root) = &args.root {
        config.store_root = root.clone();
    }

    Ok(config)
}
