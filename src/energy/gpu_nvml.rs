use std::sync::Arc;

use nvml_wrapper::Nvml;
use tracing::debug;

use crate::energy::NodeEnergyBackend;
use crate::error::{Result, TrackerError};

trait PowerSampler: Send + Sync {
    fn sample_power_w(&self) -> Result<f64>;
}

struct NvmlPowerSampler {
    nvml: Arc<Nvml>,
    index: u32,
}

impl PowerSampler for NvmlPowerSampler {
    fn sample_power_w(&self) -> Result<f64> {
        let device = self.nvml.device_by_index(self.index)?;
        let milliwatts = device.power_usage()?;
        Ok(milliwatts as f64 / 1000.0)
    }
}

/// Integrates the combined board power of every NVIDIA GPU.
pub struct GpuNvml {
    // Holds the library open for real devices; None under test.
    _nvml: Option<Arc<Nvml>>,
    samplers: Vec<Box<dyn PowerSampler>>,
    last_power_w: f64,
    energy_j: f64,
}

impl GpuNvml {
    pub fn new() -> Result<Self> {
        let nvml = Arc::new(Nvml::init().map_err(|e| {
            TrackerError::BackendUnavailable(format!("failed to initialize NVML ({e})"))
        })?);
        let count = nvml.device_count().map_err(|e| {
            TrackerError::BackendUnavailable(format!("failed to list NVML devices ({e})"))
        })?;
        let samplers: Vec<Box<dyn PowerSampler>> = (0..count)
            .map(|index| {
                Box::new(NvmlPowerSampler {
                    nvml: nvml.clone(),
                    index,
                }) as Box<dyn PowerSampler>
            })
            .collect();
        debug!(devices = count, "NVML initialized");
        Self::from_samplers(Some(nvml), samplers)
    }

    pub fn device_count(&self) -> usize {
        self.samplers.len()
    }

    fn from_samplers(
        nvml: Option<Arc<Nvml>>,
        samplers: Vec<Box<dyn PowerSampler>>,
    ) -> Result<Self> {
        if samplers.is_empty() {
            return Err(TrackerError::BackendUnavailable(
                "NVML reports no GPU devices".to_string(),
            ));
        }
        Ok(Self {
            _nvml: nvml,
            samplers,
            last_power_w: 0.0,
            energy_j: 0.0,
        })
    }
}

impl NodeEnergyBackend for GpuNvml {
    fn start(&mut self) -> Result<()> {
        self.energy_j = 0.0;
        self.last_power_w = total_power(&self.samplers)?;
        Ok(())
    }

    fn sample(&mut self, dt_seconds: f64) -> Result<()> {
        // Left Riemann sum: the previous reading covers the elapsed interval.
        self.energy_j += self.last_power_w * dt_seconds;
        self.last_power_w = total_power(&self.samplers)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn cpu_energy_joules(&self) -> Option<f64> {
        None
    }

    fn gpu_energy_joules(&self) -> Option<f64> {
        Some(self.energy_j)
    }
}

fn total_power(samplers: &[Box<dyn PowerSampler>]) -> Result<f64> {
    samplers.iter().map(|s| s.sample_power_w()).sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::{GpuNvml, PowerSampler};
    use crate::energy::NodeEnergyBackend;
    use crate::error::{Result, TrackerError};

    struct FakeSampler {
        // Watts stored as bits so tests can change the reading mid-run.
        power: Arc<AtomicU64>,
    }

    impl FakeSampler {
        fn new(power: f64) -> (Self, Arc<AtomicU64>) {
            let cell = Arc::new(AtomicU64::new(power.to_bits()));
            (
                Self {
                    power: cell.clone(),
                },
                cell,
            )
        }
    }

    impl PowerSampler for FakeSampler {
        fn sample_power_w(&self) -> Result<f64> {
            Ok(f64::from_bits(self.power.load(Ordering::SeqCst)))
        }
    }

    struct BrokenSampler;

    impl PowerSampler for BrokenSampler {
        fn sample_power_w(&self) -> Result<f64> {
            Err(TrackerError::BackendUnavailable("device lost".to_string()))
        }
    }

    #[test]
    fn integrates_combined_power() {
        let (a, _) = FakeSampler::new(30.0);
        let (b, b_power) = FakeSampler::new(20.0);
        let samplers: Vec<Box<dyn PowerSampler>> = vec![Box::new(a), Box::new(b)];
        let mut gpu = GpuNvml::from_samplers(None, samplers).unwrap();
        assert_eq!(gpu.device_count(), 2);

        gpu.start().unwrap();
        gpu.sample(1.0).unwrap();
        b_power.store(70.0f64.to_bits(), Ordering::SeqCst);
        gpu.sample(1.0).unwrap();
        gpu.sample(2.0).unwrap();
        gpu.stop().unwrap();

        // 50 W for 1 s, 50 W for 1 s, then 100 W for 2 s.
        let e = gpu.gpu_energy_joules().unwrap();
        assert!((e - 300.0).abs() < 1e-9);
        assert!(gpu.cpu_energy_joules().is_none());
    }

    #[test]
    fn no_devices_is_unavailable() {
        assert!(GpuNvml::from_samplers(None, Vec::new()).is_err());
    }

    #[test]
    fn sampler_failure_propagates() {
        let samplers: Vec<Box<dyn PowerSampler>> = vec![Box::new(BrokenSampler)];
        let mut gpu = GpuNvml::from_samplers(None, samplers).unwrap();
        assert!(gpu.start().is_err());
    }
}
