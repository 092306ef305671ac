//! CLI argument parsing for leasehold.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Leasehold: lease-based exclusive locks shared between processes.
///
/// Contenders share a lock store directory. Whoever holds the lock renews
/// its lease in the background; if it crashes, another contender takes the
/// lock over once the lease expires.
#[derive(Parser, Debug)]
#[command(name = "leasehold")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log protocol details (claims, renewals) to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for leasehold.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Contend for the lock until stopped.
    ///
    /// Prints "Lock acquired" and "Lock lost, reason: ..." as the lock
    /// changes hands. Type `q` (or close stdin) to stop; a held lock is
    /// released before exiting.
    Run(RunArgs),

    /// List lock records in the store.
    ///
    /// Shows the holder and age of each record and flags expired leases.
    Status(StoreArgs),

    /// Remove a lock record.
    ///
    /// Refuses to remove a live lease without --force.
    Clear(ClearArgs),
}

/// Options locating the config file and the lock store.
#[derive(Args, Debug, Default, Clone)]
pub struct StoreArgs {
    /// Path to a leasehold.yaml config file.
    ///
    /// Defaults to ./leasehold.yaml when present.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Lock store directory (overrides `store_root`).
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Holder identity to record (default: user@host/<random>).
    #[arg(long)]
    pub client_id: Option<String>,

    /// Lease duration in milliseconds (overrides `lease_duration_ms`).
    #[arg(long, value_name = "MS")]
    pub lease_ms: Option<u64>,

    /// Poll interval in milliseconds (overrides `poll_interval_ms`).
    #[arg(long, value_name = "MS")]
    pub poll_ms: Option<u64>,

    /// Lock one document of this collection instead of the global lock.
    #[arg(long, requires = "value")]
    pub collection: Option<String>,

    /// Document field to match (with --collection).
    #[arg(long, default_value = "_id", requires = "collection")]
    pub field: String,

    /// Value the field must equal, as JSON (bare words are taken as strings).
    #[arg(long, requires = "collection")]
    pub value: Option<String>,
}

/// Arguments for the `clear` command.
#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Key to clear, as shown by `status` (e.g. `global` or `document_lock/1_#_builds`).
    pub key: String,

    /// Clear even if the lease has not expired.
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
