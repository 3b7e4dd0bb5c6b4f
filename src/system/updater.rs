//! Merges sampler records and host counters into the snapshot.

use std::time::SystemTime;

use super::platform::HostCounters;
use super::record::{self, AneUnit, ClusterRecord, ProcessorRecord, SampleRecord};
use super::snapshot::{CoreMetric, CoreType, SystemSnapshot};
use super::units::{activity, ane_activity, bytes_to_gib, milli_to_watts, normalize_freq};
use crate::error::Result;

/// E-cluster frequency estimate relative to the host base frequency.
const E_CLUSTER_BASE_RATIO: f64 = 0.7;

/// Decode a framed record and merge it. `Ok(false)` when the bytes hold
/// nothing but padding; decode errors leave the snapshot untouched.
pub fn apply_record(snapshot: &mut SystemSnapshot, bytes: &[u8]) -> Result<bool> {
    let _span = tracing::debug_span!("updater.apply_record", len = bytes.len()).entered();

    let Some(decoded) = record::decode(bytes) else {
        return Ok(false);
    };
    merge_record(snapshot, &decoded?);
    Ok(true)
}

pub fn merge_record(snapshot: &mut SystemSnapshot, record: &SampleRecord) {
    if let Some(thermal) = &record.thermal_pressure {
        snapshot.thermal_pressure.clone_from(thermal);
    }

    if let Some(processor) = &record.processor {
        merge_processor(snapshot, processor);
    }

    if let Some(gpu) = &record.gpu {
        snapshot.gpu.active = activity(gpu.idle_ratio.unwrap_or(0.0));
        snapshot.gpu.freq = normalize_freq(gpu.freq_hz.unwrap_or(0.0));
    }

    // Never step backwards if the wall clock is adjusted.
    snapshot.timestamp = SystemTime::now().max(snapshot.timestamp);
}

/// Instantaneous power if present and nonzero, else energy per interval.
fn power_or_energy(power: Option<f64>, energy: Option<f64>) -> f64 {
    let raw = match power {
        Some(p) if p != 0.0 => p,
        _ => energy.unwrap_or(0.0),
    };
    milli_to_watts(raw)
}

fn merge_processor(snapshot: &mut SystemSnapshot, processor: &ProcessorRecord) {
    let cpu = &mut snapshot.cpu;
    cpu.cpu_power = power_or_energy(processor.cpu_power, processor.cpu_energy);
    cpu.gpu_power = power_or_energy(processor.gpu_power, processor.gpu_energy);
    cpu.package_power = milli_to_watts(processor.combined_power.unwrap_or(0.0));

    let ane = processor
        .ane_candidates()
        .into_iter()
        .find_map(|(value, unit)| value.filter(|&v| v > 0.0).map(|v| (v, unit)));
    if let Some((value, unit)) = ane {
        let watts = match unit {
            AneUnit::Milli => milli_to_watts(value),
            AneUnit::Watts => value,
        };
        cpu.ane_power = watts;
        cpu.ane_active = ane_activity(watts);
    }

    if let Some(clusters) = &processor.clusters {
        merge_clusters(snapshot, clusters);
    }
}

fn merge_clusters(snapshot: &mut SystemSnapshot, clusters: &[ClusterRecord]) {
    let cpu = &mut snapshot.cpu;
    let mut p_cluster_seen = false;

    for cluster in clusters {
        let cluster_name = cluster.name.as_deref().unwrap_or("").to_uppercase();

        if cluster.name.is_some() {
            let active = activity(cluster.idle_ratio.unwrap_or(0.0));
            let freq = normalize_freq(cluster.freq_hz.unwrap_or(0.0));

            if cluster_name.starts_with('E') {
                cpu.e_cluster_active = active;
                cpu.e_cluster_freq = freq;
            } else if cluster_name.starts_with('P') {
                // Chips with several P clusters report one entry each.
                if p_cluster_seen {
                    cpu.p_cluster_active = (cpu.p_cluster_active + active) / 2.0;
                    cpu.p_cluster_freq = cpu.p_cluster_freq.max(freq);
                } else {
                    cpu.p_cluster_active = active;
                    cpu.p_cluster_freq = freq;
                    p_cluster_seen = true;
                }
            }
        }

        let core_type = CoreType::from_cluster_name(&cluster_name);
        for core in &cluster.cpus {
            let Some(id) = core.cpu else {
                continue;
            };
            cpu.upsert_core(CoreMetric::new(
                id,
                activity(core.idle_ratio.unwrap_or(0.0)),
                normalize_freq(core.freq_hz.unwrap_or(0.0)),
                core_type,
            ));
        }
    }

    cpu.sort_cores();
}

/// Refresh base frequency and RAM from host counters.
pub fn apply_self_metrics(snapshot: &mut SystemSnapshot, host: &mut dyn HostCounters) {
    if let Some(base) = host.cpu_base_freq_mhz() {
        snapshot.cpu.p_cluster_freq = base;
        snapshot.cpu.e_cluster_freq = base * E_CLUSTER_BASE_RATIO;
    }

    let total = host.physical_memory();
    if let Some(total) = total {
        snapshot.ram.total_gb = bytes_to_gib(total);
    }

    let ram = &mut snapshot.ram;
    match (total, host.used_memory()) {
        (Some(total), Some(used)) => {
            ram.used_gb = bytes_to_gib(used);
            ram.free_percent = 100.0 * (1.0 - used as f64 / total as f64);
        }
        _ => {
            ram.used_gb = ram.total_gb * 0.5;
            ram.free_percent = 50.0;
        }
    }
}
