//! `pilot` binary.

use std::process::ExitCode;

use clap::Parser;

use pilot::config::args::{Cli, Command};
use pilot::lifecycle::{signals, startup, DrainOutcome, LifecycleCoordinator};
use pilot::observability::{logging, metrics};
use pilot::platform::LiveConnector;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("pilot {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Discovery(args) => {
            logging::init(cli.log_as_json);
            let settings = args.into_settings();

            tracing::info!(version = env!("CARGO_PKG_VERSION"), adapter = %settings.adapter, "pilot discovery starting");
            tracing::debug!(settings = ?settings, "Settings");

            if let Some(addr) = settings.metrics_address {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, address = %addr, "Failed to start metrics endpoint");
                    return ExitCode::FAILURE;
                }
            }

            let coordinator = LifecycleCoordinator::new(settings.grace_period);
            match startup::run(&coordinator, settings, &LiveConnector, signals::wait_for_termination()).await {
                Ok(DrainOutcome::Completed) => {
                    tracing::info!("Shutdown complete");
                    ExitCode::SUCCESS
                }
                Ok(DrainOutcome::TimedOut { pending }) => {
                    tracing::warn!(pending, "Shutdown complete with tasks still running");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
