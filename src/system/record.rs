//! Typed view of one powermetrics plist sample.
//!
//! Only the keys the updater reads are modelled; everything else in the
//! document is ignored. Numeric fields accept plist integers and reals.

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SampleRecord {
    pub thermal_pressure: Option<String>,
    pub processor: Option<ProcessorRecord>,
    pub gpu: Option<GpuRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcessorRecord {
    pub cpu_power: Option<f64>,
    pub cpu_energy: Option<f64>,
    pub gpu_power: Option<f64>,
    pub gpu_energy: Option<f64>,
    pub ane_power: Option<f64>,
    pub ane_energy: Option<f64>,
    #[serde(rename = "ane_power_mW")]
    pub ane_power_mw: Option<f64>,
    pub combined_power: Option<f64>,
    pub clusters: Option<Vec<ClusterRecord>>,
}

/// How an ANE candidate key's value converts to Watts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AneUnit {
    Milli,
    Watts,
}

impl ProcessorRecord {
    /// ANE candidates in lookup order: mW, then mJ per interval, then the
    /// bare key, which is already in Watts.
    pub fn ane_candidates(&self) -> [(Option<f64>, AneUnit); 3] {
        [
            (self.ane_power_mw, AneUnit::Milli),
            (self.ane_energy, AneUnit::Milli),
            (self.ane_power, AneUnit::Watts),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterRecord {
    pub name: Option<String>,
    pub idle_ratio: Option<f64>,
    pub freq_hz: Option<f64>,
    pub cpus: Vec<CoreRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CoreRecord {
    pub cpu: Option<i64>,
    pub idle_ratio: Option<f64>,
    pub freq_hz: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GpuRecord {
    pub idle_ratio: Option<f64>,
    pub freq_hz: Option<f64>,
}

/// Bytes the writer leaves between documents.
fn is_padding(b: u8) -> bool {
    matches!(b, 0 | b'\t' | b'\n' | b'\r' | b' ')
}

/// Strip leading padding, then decode. `None` for an all-padding record.
pub fn decode(bytes: &[u8]) -> Option<Result<SampleRecord>> {
    let start = bytes.iter().position(|&b| !is_padding(b))?;
    Some(plist::from_bytes(&bytes[start..]).map_err(Into::into))
}
