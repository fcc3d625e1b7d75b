mod cli;
mod emissions;
mod energy;
mod error;
mod output;
mod shutdown;
mod tracker;
mod util;

use std::io::{self, Write};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::emissions::{EmissionsTracker, TrackerConfig};
use crate::energy::BackendConfig;
use crate::error::{Result, TrackerError};
use crate::shutdown::OsSignals;
use crate::tracker::{Lifecycle, Outcome};

fn main() {
    init_tracing();
    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // Diagnostics share stdout with the tracker messages. Stdout may
            // already be gone here, so a failed write is not fatal.
            let _ = writeln!(io::stdout(), "error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(io::stdout)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

fn real_main() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage problems are reported on stdout like every other message.
            write!(io::stdout(), "{}", err.render())?;
            return Ok(if err.use_stderr() { 1 } else { 0 });
        }
    };
    cli.validate().map_err(TrackerError::InvalidArg)?;

    let config = TrackerConfig {
        backends: BackendConfig {
            cpu_source: cli.cpu_source,
            cpu_power_w: cli.cpu_power,
            gpu: cli.gpu,
            rapl_root: cli.rapl_root.clone(),
        },
        carbon_intensity: cli.carbon_intensity,
    };
    let lifecycle = Lifecycle {
        interval: cli.interval.into(),
        format: cli.output,
    };

    let outcome = lifecycle.execute(
        cli.command_word().as_deref(),
        || EmissionsTracker::from_config(&config),
        &OsSignals,
        &mut io::stdout(),
    )?;

    match outcome {
        Outcome::Stopped(measurement) => {
            info!(
                duration_s = measurement.duration_s,
                total_energy_kwh = measurement.total_energy_kwh,
                emissions_kg = measurement.emissions_kg,
                cpu_source = %measurement.cpu_source,
                "tracking finished"
            );
            Ok(0)
        }
        Outcome::MissingCommand | Outcome::UnknownCommand => Ok(1),
    }
}
