// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # FSP Node
//!
//! Entry point for the `fsp-node` binary. Parses CLI arguments, initializes
//! logging and metrics, and replays issuance scenarios against an
//! in-process instrument registry.
//!
//! The binary supports three subcommands:
//!
//! - `replay`: execute a scenario, one JSON outcome line per step
//! - `check`: parse and validate a scenario without executing it
//! - `version`: print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cli::{Commands, FspNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use scenario::{Scenario, ScenarioRunner};

fn main() -> Result<()> {
    let cli = FspNodeCli::parse();

    match cli.command {
        Commands::Replay(args) => {
            logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));
            replay(args)
        }
        Commands::Check(args) => {
            logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));
            check(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Executes every step of a scenario and reports the outcomes on stdout.
///
/// Rejected steps are reported, not fatal. The command fails when a step
/// disagrees with its expected outcome or the final audit does not hold.
fn replay(args: cli::ReplayArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    scenario.validate()?;

    let metrics = NodeMetrics::new().context("failed to register metrics")?;
    let runner = ScenarioRunner::new(&scenario).context("failed to activate instruments")?;
    metrics.instruments_active.set(runner.instrument_count() as i64);

    tracing::info!(
        scenario = %args.scenario.display(),
        instruments = runner.instrument_count(),
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut mismatches = 0usize;

    for (index, spec) in scenario.steps.iter().enumerate() {
        let timer = metrics.step_duration_seconds.start_timer();
        let outcome = runner.run_step(index, spec);
        timer.observe_duration();

        match &outcome.error_kind {
            None => metrics.record_committed(outcome.op),
            Some(kind) => metrics.record_rejected(outcome.op, kind),
        }
        if !outcome.as_expected {
            mismatches += 1;
        }
        writeln!(out, "{}", serde_json::to_string(&outcome)?)?;
    }

    for spec in &scenario.instruments {
        if let Some(manager) = runner.manager(&spec.name) {
            tracing::info!(
                name = %spec.name,
                issuances = manager.issuance_count(),
                deactivated = manager.is_deactivated(),
                "instrument summary"
            );
        }
    }

    if args.metrics {
        write!(out, "{}", metrics.encode()?)?;
    }
    out.flush()?;

    let failed = runner.audit();
    if !failed.is_empty() {
        bail!("conservation audit failed for: {}", failed.join(", "));
    }
    if mismatches > 0 {
        bail!("{mismatches} step(s) did not match their expected outcome");
    }
    tracing::info!("replay complete");
    Ok(())
}

/// Parses and validates a scenario without activating anything.
fn check(args: cli::CheckArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    scenario.validate()?;

    let referenced = scenario::referenced_instruments(&scenario);
    for spec in &scenario.instruments {
        if !referenced.contains(spec.name.as_str()) {
            tracing::warn!(name = %spec.name, "instrument is never used");
        }
    }

    println!(
        "{}: {} instrument(s), {} step(s), ok",
        args.scenario.display(),
        scenario.instruments.len(),
        scenario.steps.len()
    );
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("fsp-node {}", env!("CARGO_PKG_VERSION"));
    println!("codec     v{}", fsp_protocol::config::CODEC_VERSION);
    println!("rustc     {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
