use std::path::PathBuf;

use tracing::info;

use crate::cli::CpuSource;
use crate::error::Result;

pub mod constant;
pub mod cpu_rapl;
pub mod gpu_nvml;

pub trait NodeEnergyBackend {
    fn start(&mut self) -> Result<()>;
    fn sample(&mut self, dt_seconds: f64) -> Result<()>;
    fn stop(&mut self) -> Result<()>;

    fn cpu_energy_joules(&self) -> Option<f64>;
    fn gpu_energy_joules(&self) -> Option<f64>;
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub cpu_source: CpuSource,
    pub cpu_power_w: f64,
    pub gpu: bool,
    pub rapl_root: Option<PathBuf>,
}

pub enum CpuBackend {
    Rapl(cpu_rapl::CpuRapl),
    Constant(constant::ConstantCpuPower),
}

impl CpuBackend {
    fn select(config: &BackendConfig) -> Result<Self> {
        match config.cpu_source {
            CpuSource::Rapl => Ok(Self::rapl(cpu_rapl::CpuRapl::discover(
                config.rapl_root.clone(),
            )?)),
            CpuSource::Constant => Ok(Self::constant(config.cpu_power_w)),
            CpuSource::Auto => match cpu_rapl::CpuRapl::discover(config.rapl_root.clone()) {
                Ok(rapl) => Ok(Self::rapl(rapl)),
                Err(err) => {
                    info!(
                        error = %err,
                        power_w = config.cpu_power_w,
                        "RAPL unavailable, estimating CPU energy from constant power"
                    );
                    Ok(Self::constant(config.cpu_power_w))
                }
            },
        }
    }

    fn rapl(rapl: cpu_rapl::CpuRapl) -> Self {
        info!(zones = rapl.zone_count(), "reading CPU energy from RAPL");
        CpuBackend::Rapl(rapl)
    }

    fn constant(power_w: f64) -> Self {
        CpuBackend::Constant(constant::ConstantCpuPower::new(power_w))
    }

    pub fn label(&self) -> &'static str {
        match self {
            CpuBackend::Rapl(_) => "rapl",
            CpuBackend::Constant(_) => "constant",
        }
    }

    fn as_backend(&mut self) -> &mut dyn NodeEnergyBackend {
        match self {
            CpuBackend::Rapl(rapl) => rapl,
            CpuBackend::Constant(constant) => constant,
        }
    }

    fn energy_joules(&self) -> Option<f64> {
        match self {
            CpuBackend::Rapl(rapl) => rapl.cpu_energy_joules(),
            CpuBackend::Constant(constant) => constant.cpu_energy_joules(),
        }
    }
}

pub struct EnergyBackends {
    cpu: CpuBackend,
    gpu: Option<gpu_nvml::GpuNvml>,
}

impl EnergyBackends {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let cpu = CpuBackend::select(config)?;

        // A machine without NVIDIA hardware simply has no GPU share.
        let gpu = if config.gpu {
            match gpu_nvml::GpuNvml::new() {
                Ok(gpu) => Some(gpu),
                Err(err) => {
                    info!(error = %err, "GPU energy not tracked");
                    None
                }
            }
        } else {
            None
        };

        info!(
            cpu_source = cpu.label(),
            gpu_devices = gpu.as_ref().map_or(0, |g| g.device_count()),
            "energy backends ready"
        );
        Ok(Self { cpu, gpu })
    }

    pub fn cpu_source(&self) -> &'static str {
        self.cpu.label()
    }
}

impl NodeEnergyBackend for EnergyBackends {
    fn start(&mut self) -> Result<()> {
        self.cpu.as_backend().start()?;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.start()?;
        }
        Ok(())
    }

    fn sample(&mut self, dt_seconds: f64) -> Result<()> {
        self.cpu.as_backend().sample(dt_seconds)?;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.sample(dt_seconds)?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.cpu.as_backend().stop()?;
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.stop()?;
        }
        Ok(())
    }

    fn cpu_energy_joules(&self) -> Option<f64> {
        self.cpu.energy_joules()
    }

    fn gpu_energy_joules(&self) -> Option<f64> {
        self.gpu.as_ref().and_then(|g| g.gpu_energy_joules())
    }
}
