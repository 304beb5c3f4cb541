//! Command-line interface.

mod demo;
mod doctor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use self::demo::{DemoOptions, DemoReport, run_demo};
pub use self::doctor::run_doctor_command;

#[derive(Parser, Debug)]
#[command(name = "mystery-garden")]
#[command(about = "Plant, grow and decrypt encrypted plants", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Explicit TOML config file (default: ~/.mystery-garden/config.toml)
    #[arg(long, global = true, env = "GARDEN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full plant/grow/decrypt/mature flow against a simulated chain
    Demo {
        /// Maximum number of grow rounds
        #[arg(long, default_value = "20")]
        grows: u32,

        /// Seed for input generation and the demo account
        #[arg(long)]
        seed: Option<u64>,

        /// Growth required before a plant may be marked mature
        #[arg(long)]
        threshold: Option<u64>,
    },

    /// Check configuration, deployments and the signature store
    Doctor {
        /// Chain id whose deployment should be checked
        #[arg(long, env = "GARDEN_CHAIN_ID")]
        chain_id: Option<u64>,

        /// Exit with an error if any check fails
        #[arg(long)]
        strict: bool,
    },
}
