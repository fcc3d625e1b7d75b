use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::energy::{BackendConfig, EnergyBackends, NodeEnergyBackend};
use crate::error::{Result, TrackerError};
use crate::util::joules_to_kwh;

/// One begin-to-end measurement interval.
///
/// `end` must be called at most once; the lifecycle controller guarantees
/// this by construction.
pub trait Session {
    fn begin(&mut self) -> Result<()>;
    /// Called on every wake-up of the wait loop.
    fn sample(&mut self) -> Result<()>;
    fn end(&mut self) -> Result<Measurement>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_energy_j: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_energy_j: Option<f64>,
    pub total_energy_kwh: f64,
    pub emissions_kg: f64,
    pub carbon_intensity_kg_per_kwh: f64,
    pub cpu_source: String,
}

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub backends: BackendConfig,
    pub carbon_intensity: f64,
}

/// Converts the energy drawn by this node into kg CO2eq.
pub struct EmissionsTracker<B = EnergyBackends> {
    backend: B,
    cpu_source: &'static str,
    carbon_intensity: f64,
    started_at: Option<Instant>,
    last_tick: Option<Instant>,
}

impl EmissionsTracker<EnergyBackends> {
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let backends = EnergyBackends::new(&config.backends)?;
        let cpu_source = backends.cpu_source();
        Ok(Self::new(backends, cpu_source, config.carbon_intensity))
    }
}

impl<B: NodeEnergyBackend> EmissionsTracker<B> {
    pub fn new(backend: B, cpu_source: &'static str, carbon_intensity: f64) -> Self {
        Self {
            backend,
            cpu_source,
            carbon_intensity,
            started_at: None,
            last_tick: None,
        }
    }

    fn advance(&mut self) -> Result<()> {
        let last = self
            .last_tick
            .ok_or_else(|| TrackerError::InvalidArg("session has not begun".to_string()))?;
        let now = Instant::now();
        let dt = (now - last).as_secs_f64();
        if dt > 0.0 {
            self.backend.sample(dt)?;
        }
        self.last_tick = Some(now);
        Ok(())
    }

    fn energy_kwh(&self) -> f64 {
        let cpu = self.backend.cpu_energy_joules().unwrap_or(0.0);
        let gpu = self.backend.gpu_energy_joules().unwrap_or(0.0);
        joules_to_kwh(cpu + gpu)
    }

    /// Emissions accumulated up to the latest sample.
    pub fn running_emissions_kg(&self) -> f64 {
        self.energy_kwh() * self.carbon_intensity
    }
}

impl<B: NodeEnergyBackend> Session for EmissionsTracker<B> {
    fn begin(&mut self) -> Result<()> {
        self.backend.start()?;
        let now = Instant::now();
        self.started_at = Some(now);
        self.last_tick = Some(now);
        Ok(())
    }

    fn sample(&mut self) -> Result<()> {
        self.advance()?;
        debug!(
            cpu_energy_j = ?self.backend.cpu_energy_joules(),
            gpu_energy_j = ?self.backend.gpu_energy_joules(),
            "sampled"
        );
        info!(
            energy_kwh = self.energy_kwh(),
            emissions_kg = self.running_emissions_kg(),
            "emissions update"
        );
        Ok(())
    }

    fn end(&mut self) -> Result<Measurement> {
        // Account for the partial interval since the last wake-up.
        self.advance()?;
        self.backend.stop()?;

        let duration_s = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let cpu_energy_j = self.backend.cpu_energy_joules();
        let gpu_energy_j = self.backend.gpu_energy_joules();
        let total_energy_kwh = self.energy_kwh();

        Ok(Measurement {
            duration_s,
            cpu_energy_j,
            gpu_energy_j,
            total_energy_kwh,
            emissions_kg: total_energy_kwh * self.carbon_intensity,
            carbon_intensity_kg_per_kwh: self.carbon_intensity,
            cpu_source: self.cpu_source.to_string(),
        })
    }
}
