use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub sampler: SamplerConfig,
    pub permission: PermissionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub refresh_rate_ms: u64,
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Absolute path of the privileged sampling binary.
    pub binary: PathBuf,
    pub sudo: PathBuf,
    pub output_file: PathBuf,
    pub interval_ms: u64,
    pub samplers: Vec<String>,
    pub stop_timeout_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            binary: PathBuf::from("/usr/bin/powermetrics"),
            sudo: PathBuf::from("/usr/bin/sudo"),
            output_file: PathBuf::from("/tmp/asistat.plist"),
            interval_ms: 1000,
            samplers: [
                "tasks",
                "battery",
                "network",
                "disk",
                "interrupts",
                "cpu_power",
                "gpu_power",
                "ane_power",
                "thermal",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            stop_timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub policy_file: PathBuf,
    /// Pause after a successful grant before re-checking permission.
    pub grant_settle_ms: u64,
    /// Pause between stopping the old sampler and launching the new one.
    pub restart_delay_ms: u64,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        PermissionConfig {
            policy_file: PathBuf::from("/etc/sudoers.d/asistat"),
            grant_settle_ms: 500,
            restart_delay_ms: 1000,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("asistat").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring invalid config {}: {e}", path.display());
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}
