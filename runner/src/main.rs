//! olly-ats runs acceptance checks of the observability operator against a live cluster.
#![deny(warnings)]
#![deny(missing_docs)]

mod checks;
mod fixtures;
mod scenario;
mod suite;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OTLP collector receiving traces and metrics. Nothing is exported when unset.
    #[arg(long, env = "ATS_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

/// Available Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Set up the scenario and run the selected checks
    Run(suite::Opts),
    /// Print the scenario plan as YAML without touching the cluster
    Plan(scenario::Opts),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Run(_) => "run",
            Command::Plan(_) => "plan",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let telemetry = olly_ats_common::telemetry::init(args.otlp_endpoint.clone()).await?;

    let meter = global::meter("olly-ats");
    let runs = meter
        .u64_counter("ats_runs")
        .with_description("Number of runs of the acceptance test runner")
        .init();
    runs.add(1, &[KeyValue::new("command", args.command.name())]);

    info!(?args.command, ?args.otlp_endpoint, "starting olly-ats");
    let result = match args.command {
        Command::Run(opts) => suite::run(opts).await,
        Command::Plan(opts) => scenario::plan(opts).map(|()| suite::SuiteReport::default()),
    };
    // Flush traces and metrics before reporting the outcome
    let shutdown = telemetry.shutdown();
    conclude(result, shutdown)
}

/// Turn the run result into the process outcome.
///
/// A failed telemetry flush is only logged so it never masks the run result.
fn conclude(result: Result<suite::SuiteReport>, shutdown: Result<()>) -> Result<()> {
    if let Err(err) = shutdown {
        warn!(%err, "failed to flush telemetry");
    }
    let report = result?;
    if !report.is_success() {
        let failed: Vec<_> = report.failed().map(|report| report.check.name()).collect();
        bail!(
            "{} of {} checks failed: {}",
            failed.len(),
            report.checks.len(),
            failed.join(", ")
        );
    }
    if !report.checks.is_empty() {
        info!(checks = report.checks.len(), "all checks passed");
    }
    Ok(())
}
