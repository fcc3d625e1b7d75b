use std::borrow::Cow;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "carbon-tracker",
    version,
    about = "Track the carbon emissions of this machine until interrupted"
)]
pub struct Cli {
    /// How long the wait loop sleeps between shutdown checks and samples.
    #[arg(long, default_value = "1s")]
    pub interval: humantime::Duration,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[arg(long, value_enum, default_value_t = CpuSource::Auto)]
    pub cpu_source: CpuSource,

    /// Estimated CPU draw in watts when RAPL counters are not used.
    #[arg(long, default_value_t = 42.5)]
    pub cpu_power: f64,

    #[arg(long = "no-gpu", default_value_t = true, action = clap::ArgAction::SetFalse)]
    pub gpu: bool,

    #[arg(long)]
    pub rapl_root: Option<PathBuf>,

    /// Grid carbon intensity in kg CO2eq per kWh.
    #[arg(long, default_value_t = 0.475)]
    pub carbon_intensity: f64,

    /// Only `start` is recognized; anything after the first word is ignored.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<OsString>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CpuSource {
    Auto,
    Rapl,
    Constant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerCommand {
    Start,
}

impl TrackerCommand {
    /// Matches case-insensitively; anything else is an unknown command.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("start") {
            Some(TrackerCommand::Start)
        } else {
            None
        }
    }
}

impl Cli {
    /// The first word after the options, decoded lossily so that any token
    /// still reaches command matching.
    pub fn command_word(&self) -> Option<Cow<'_, str>> {
        self.command.first().map(|word| word.to_string_lossy())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval.as_ref().is_zero() {
            return Err("interval must be > 0".to_string());
        }

        if !self.cpu_power.is_finite() || self.cpu_power < 0.0 {
            return Err("cpu-power must be a non-negative number".to_string());
        }

        if !self.carbon_intensity.is_finite() || self.carbon_intensity < 0.0 {
            return Err("carbon-intensity must be a non-negative number".to_string());
        }

        Ok(())
    }
}
