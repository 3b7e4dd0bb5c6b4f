use crate::system::snapshot::SystemSnapshot;

pub fn format_mhz(mhz: f64) -> String {
    if mhz >= 1000.0 {
        format!("{:.2} GHz", mhz / 1000.0)
    } else {
        format!("{mhz:.0} MHz")
    }
}

pub fn format_watts(watts: f64) -> String {
    if watts < 1.0 {
        format!("{:.0} mW", watts * 1000.0)
    } else {
        format!("{watts:.2} W")
    }
}

pub fn format_gb(gb: f64) -> String {
    format!("{gb:.1} GB")
}

/// One status line per snapshot for the text output mode.
pub fn snapshot_line(snapshot: &SystemSnapshot) -> String {
    let cpu = &snapshot.cpu;
    format!(
        "E {:.0}% @ {} | P {:.0}% @ {} | GPU {:.0}% @ {} | ANE {:.0}% | \
         pkg {} cpu {} gpu {} ane {} | RAM {} / {} ({:.0}% free) | {}",
        cpu.e_cluster_active,
        format_mhz(cpu.e_cluster_freq),
        cpu.p_cluster_active,
        format_mhz(cpu.p_cluster_freq),
        snapshot.gpu.active,
        format_mhz(snapshot.gpu.freq),
        cpu.ane_active,
        format_watts(cpu.package_power),
        format_watts(cpu.cpu_power),
        format_watts(cpu.gpu_power),
        format_watts(cpu.ane_power),
        format_gb(snapshot.ram.used_gb),
        format_gb(snapshot.ram.total_gb),
        snapshot.ram.free_percent,
        snapshot.thermal_pressure,
    )
}
