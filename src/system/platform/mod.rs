/// Page counters that make up "used" memory on macOS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub active: u64,
    pub wired: u64,
    pub compressed: u64,
}

impl PageCounts {
    pub fn used_bytes(&self, page_size: u64) -> u64 {
        (self.active + self.wired + self.compressed) * page_size
    }
}

/// Host-level counters read without the privileged sampler.
pub trait HostCounters {
    fn cpu_brand(&mut self) -> Option<String>;
    fn cpu_base_freq_mhz(&mut self) -> Option<f64>;
    fn physical_memory(&mut self) -> Option<u64>;
    fn used_memory(&mut self) -> Option<u64>;
}

#[cfg(not(target_os = "macos"))]
mod fallback;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(not(target_os = "macos"))]
use fallback as platform_impl;
#[cfg(target_os = "macos")]
use macos as platform_impl;

pub fn host_counters() -> Box<dyn HostCounters + Send> {
    Box::new(platform_impl::Platform::new())
}
