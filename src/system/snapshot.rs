use std::time::SystemTime;

use serde::Serialize;

pub const PLACEHOLDER_CPU_NAME: &str = "Apple Silicon";
pub const PLACEHOLDER_THERMAL: &str = "Nominal";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CoreType {
    Efficiency,
    Performance,
}

impl CoreType {
    /// Infer the core type from the owning cluster's name ("E0", "P1", ...).
    /// Anything that is not E-prefixed counts as performance.
    pub fn from_cluster_name(name: &str) -> Self {
        if name.to_uppercase().starts_with('E') {
            CoreType::Efficiency
        } else {
            CoreType::Performance
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            CoreType::Efficiency => "E",
            CoreType::Performance => "P",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoreMetric {
    pub id: i64,
    pub name: String,
    pub active: f64,
    pub freq: f64,
    #[serde(rename = "type")]
    pub core_type: CoreType,
}

impl CoreMetric {
    pub fn new(id: i64, active: f64, freq: f64, core_type: CoreType) -> Self {
        CoreMetric {
            id,
            name: format!("{}-Core {id}", core_type.prefix()),
            active,
            freq,
            core_type,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CpuMetrics {
    pub e_cluster_active: f64,
    pub p_cluster_active: f64,
    pub e_cluster_freq: f64,
    pub p_cluster_freq: f64,
    pub package_power: f64,
    pub cpu_power: f64,
    pub gpu_power: f64,
    pub ane_power: f64,
    /// Estimated from `ane_power`, not measured.
    pub ane_active: f64,
    pub cores: Vec<CoreMetric>,
}

impl CpuMetrics {
    /// Replace the entry with the same id in place, or append a new one.
    /// Callers re-sort with [`CpuMetrics::sort_cores`] once a batch is merged.
    pub fn upsert_core(&mut self, core: CoreMetric) {
        match self.cores.iter_mut().find(|c| c.id == core.id) {
            Some(existing) => *existing = core,
            None => self.cores.push(core),
        }
    }

    pub fn sort_cores(&mut self) {
        self.cores.sort_by_key(|c| c.id);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GpuMetrics {
    pub active: f64,
    pub freq: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RamMetrics {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_percent: f64,
    /// Reserved; nothing in the pipeline fills it yet.
    pub swap_used_gb: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub cpu: CpuMetrics,
    pub gpu: GpuMetrics,
    pub ram: RamMetrics,
    pub thermal_pressure: String,
    pub cpu_name: String,
    pub timestamp: SystemTime,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        SystemSnapshot {
            cpu: CpuMetrics::default(),
            gpu: GpuMetrics::default(),
            ram: RamMetrics::default(),
            thermal_pressure: PLACEHOLDER_THERMAL.to_string(),
            cpu_name: PLACEHOLDER_CPU_NAME.to_string(),
            timestamp: SystemTime::now(),
        }
    }
}
