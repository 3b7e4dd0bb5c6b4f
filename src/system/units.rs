//! Conversions from the sampler's mixed units into MHz, Watts and percent.

/// Readings above this are taken to be Hz rather than MHz.
///
/// Heuristic only: powermetrics does not tag its frequency units.
pub const HZ_THRESHOLD: f64 = 10_000.0;

/// Assumed ANE power draw at full activity, in Watts.
pub const ANE_MAX_WATTS: f64 = 5.0;

pub fn normalize_freq(raw: f64) -> f64 {
    if raw > HZ_THRESHOLD {
        raw / 1_000_000.0
    } else {
        raw
    }
}

/// Milliwatts, or millijoules per one-second interval, to Watts.
pub fn milli_to_watts(raw: f64) -> f64 {
    raw / 1000.0
}

/// Busy percentage from an idle ratio in `[0, 1]`. Not clamped.
pub fn activity(idle_ratio: f64) -> f64 {
    (1.0 - idle_ratio) * 100.0
}

pub fn ane_activity(watts: f64) -> f64 {
    (watts / ANE_MAX_WATTS * 100.0).min(100.0)
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / 1_073_741_824.0
}
