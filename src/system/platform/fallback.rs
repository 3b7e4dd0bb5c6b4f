use sysinfo::System;

use super::HostCounters;

/// Host counters via `sysinfo` on platforms without the mach APIs.
pub struct Platform {
    sys: System,
}

impl Platform {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Platform { sys }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCounters for Platform {
    fn cpu_brand(&mut self) -> Option<String> {
        self.sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
    }

    fn cpu_base_freq_mhz(&mut self) -> Option<f64> {
        self.sys.refresh_cpu_all();
        self.sys
            .cpus()
            .iter()
            .map(|cpu| cpu.frequency())
            .max()
            .filter(|&mhz| mhz > 0)
            .map(|mhz| mhz as f64)
    }

    fn physical_memory(&mut self) -> Option<u64> {
        self.sys.refresh_memory();
        Some(self.sys.total_memory()).filter(|&total| total > 0)
    }

    fn used_memory(&mut self) -> Option<u64> {
        Some(self.sys.used_memory()).filter(|&used| used > 0)
    }
}
