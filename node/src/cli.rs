//! # CLI Interface
//!
//! Defines the command-line argument structure for `fsp-node` using
//! `clap` derive. Supports three subcommands: `replay`, `check`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// FSP issuance engine operator tool.
///
/// Replays JSON scenario files against an in-process instrument registry
/// and reports the outcome of every step.
#[derive(Parser, Debug)]
#[command(
    name = "fsp-node",
    about = "FSP issuance engine operator tool",
    version,
    propagate_version = true
)]
pub struct FspNodeCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "FSP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(
        long,
        global = true,
        env = "FSP_LOG_LEVEL",
        default_value = crate::logging::DEFAULT_DIRECTIVES
    )]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a scenario and print one JSON outcome line per step.
    Replay(ReplayArgs),
    /// Parse and validate a scenario without executing it.
    Check(CheckArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Path to the scenario file (JSON).
    pub scenario: PathBuf,

    /// Print Prometheus metrics after the replay.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for the `check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Path to the scenario file (JSON).
    pub scenario: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        FspNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_replay_flags() {
        let cli = FspNodeCli::try_parse_from(["fsp-node", "replay", "demo.json", "--metrics"]).unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.scenario, PathBuf::from("demo.json"));
                assert!(args.metrics);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
