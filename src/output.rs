use std::io::Write;

use clap::ValueEnum;

use crate::emissions::Measurement;
use crate::error::Result;

pub const MISSING_COMMAND: &str = "Please provide 'start' as an argument.";
pub const STARTING: &str = "Starting the tracker...";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Use 'start'.";
pub const STARTED: &str = "Tracker started.";
pub const SIGNAL_RECEIVED: &str = "Signal received, stopping the tracker...";
pub const STOPPED: &str = "Tracker stopped.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn print_line<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

/// Final lines printed once the session has ended.
pub fn print_stopped<W: Write>(
    out: &mut W,
    format: OutputFormat,
    measurement: &Measurement,
) -> Result<()> {
    writeln!(out, "{STOPPED}")?;
    writeln!(out, "Total emissions: {}", measurement.emissions_kg)?;
    if format == OutputFormat::Json {
        writeln!(out, "{}", serde_json::to_string_pretty(measurement)?)?;
    }
    out.flush()?;
    Ok(())
}
