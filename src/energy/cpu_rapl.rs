use std::env::consts::ARCH;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::energy::NodeEnergyBackend;
use crate::error::{Result, TrackerError};
use crate::util::counter_delta;

pub const DEFAULT_POWERCAP_ROOT: &str = "/sys/class/powercap";

struct RaplZone {
    name: String,
    energy_path: PathBuf,
    max_uj: u64,
    last_uj: Option<u64>,
    accumulated_uj: u64,
}

impl RaplZone {
    fn advance(&mut self) -> Result<()> {
        let last = self.last_uj.ok_or_else(|| {
            TrackerError::InvalidArg(format!("RAPL zone {} was never started", self.name))
        })?;
        let current = read_u64(&self.energy_path)?;
        self.accumulated_uj += counter_delta(current, last, self.max_uj);
        self.last_uj = Some(current);
        Ok(())
    }
}

/// Package-level RAPL zones, read on every sample so a counter may roll over
/// any number of times during a session.
pub struct CpuRapl {
    zones: Vec<RaplZone>,
    total_j: Option<f64>,
}

impl CpuRapl {
    pub fn discover(root: Option<PathBuf>) -> Result<Self> {
        if ARCH != "x86_64" && !cfg!(test) {
            return Err(TrackerError::BackendUnavailable(format!(
                "RAPL counters need an x86_64 host; current architecture is {ARCH}"
            )));
        }

        let root = root.unwrap_or_else(|| PathBuf::from(DEFAULT_POWERCAP_ROOT));
        if !root.exists() {
            return Err(TrackerError::BackendUnavailable(format!(
                "no powercap tree at {}; is the intel_rapl module loaded?",
                root.display()
            )));
        }

        let mut zones = Vec::new();
        // Zones are symlinks under the powercap class directory.
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .max_depth(2)
            .sort_by_file_name();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if entry.file_name() != "energy_uj" {
                continue;
            }
            let energy_path = entry.into_path();
            let Some(name) = zone_name(&energy_path) else {
                continue;
            };
            if !is_package_zone(&name) {
                debug!(zone = %name, "skipping RAPL subzone");
                continue;
            }
            let max_path = energy_path.with_file_name("max_energy_range_uj");
            if !max_path.exists() {
                continue;
            }
            let max_uj = read_u64(&max_path)?;
            // Counters are root-only on most kernels; fail here, not at begin.
            read_u64(&energy_path)?;
            zones.push(RaplZone {
                name,
                energy_path,
                max_uj,
                last_uj: None,
                accumulated_uj: 0,
            });
        }

        if zones.is_empty() {
            return Err(TrackerError::BackendUnavailable(format!(
                "no readable RAPL package zones under {}",
                root.display()
            )));
        }

        debug!(
            zones = ?zones.iter().map(|z| z.name.as_str()).collect::<Vec<_>>(),
            "discovered RAPL zones"
        );
        Ok(Self {
            zones,
            total_j: None,
        })
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    fn advance(&mut self) -> Result<()> {
        let mut total_uj: u64 = 0;
        for zone in &mut self.zones {
            zone.advance()?;
            total_uj += zone.accumulated_uj;
        }
        self.total_j = Some(total_uj as f64 / 1_000_000.0);
        Ok(())
    }
}

impl NodeEnergyBackend for CpuRapl {
    fn start(&mut self) -> Result<()> {
        for zone in &mut self.zones {
            zone.last_uj = Some(read_u64(&zone.energy_path)?);
            zone.accumulated_uj = 0;
        }
        self.total_j = Some(0.0);
        Ok(())
    }

    fn sample(&mut self, _dt_seconds: f64) -> Result<()> {
        self.advance()
    }

    fn stop(&mut self) -> Result<()> {
        self.advance()
    }

    fn cpu_energy_joules(&self) -> Option<f64> {
        self.total_j
    }

    fn gpu_energy_joules(&self) -> Option<f64> {
        None
    }
}

fn zone_name(energy_path: &Path) -> Option<String> {
    energy_path
        .parent()?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

// `intel-rapl:0` is a package. `intel-rapl:0:0` is a core/uncore part of it
// and `intel-rapl-mmio:0` is a second view of the same package counter.
fn is_package_zone(name: &str) -> bool {
    name.strip_prefix("intel-rapl:")
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

fn read_u64(path: &Path) -> Result<u64> {
    let contents = fs::read_to_string(path)?;
    contents
        .trim()
        .parse::<u64>()
        .map_err(|e| TrackerError::InvalidArg(format!("{}: {}", path.display(), e)))
}
