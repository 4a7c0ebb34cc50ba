//! Command line interface.

use std::path::PathBuf;

use clap::Parser;

/// Supervisor for a KF2 dedicated server and its stats companion.
#[derive(Debug, Parser)]
#[command(name = "kf2-manager", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "manager.toml")]
    pub config: PathBuf,

    /// Skip the one-shot firewall setup at startup.
    #[arg(long)]
    pub skip_firewall: bool,

    /// Skip the initial maintenance cycle and wait for the first scheduled
    /// one instead.
    #[arg(long)]
    pub skip_initial_cycle: bool,
}
