use crate::energy::NodeEnergyBackend;
use crate::error::Result;

/// CPU estimate for hosts without readable RAPL counters: a fixed draw,
/// integrated over the sampled time.
pub struct ConstantCpuPower {
    power_w: f64,
    energy_j: f64,
}

impl ConstantCpuPower {
    pub fn new(power_w: f64) -> Self {
        Self {
            power_w,
            energy_j: 0.0,
        }
    }
}

impl NodeEnergyBackend for ConstantCpuPower {
    fn start(&mut self) -> Result<()> {
        self.energy_j = 0.0;
        Ok(())
    }

    fn sample(&mut self, dt_seconds: f64) -> Result<()> {
        self.energy_j += self.power_w * dt_seconds;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn cpu_energy_joules(&self) -> Option<f64> {
        Some(self.energy_j)
    }

    fn gpu_energy_joules(&self) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::ConstantCpuPower;
    use crate::energy::NodeEnergyBackend;

    #[test]
    fn accumulates_power_times_time() {
        let mut cpu = ConstantCpuPower::new(40.0);
        cpu.start().unwrap();
        cpu.sample(0.5).unwrap();
        cpu.sample(1.5).unwrap();
        cpu.stop().unwrap();
        assert!((cpu.cpu_energy_joules().unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn start_resets_energy() {
        let mut cpu = ConstantCpuPower::new(10.0);
        cpu.sample(3.0).unwrap();
        cpu.start().unwrap();
        assert_eq!(cpu.cpu_energy_joules(), Some(0.0));
    }
}
