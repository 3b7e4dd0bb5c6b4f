use std::ffi::CString;
use std::mem;

use super::{HostCounters, PageCounts};

/// Used when the kernel page size cannot be read.
const FALLBACK_PAGE_SIZE: u64 = 16384;

#[derive(Default)]
pub struct Platform;

impl Platform {
    pub fn new() -> Self {
        Platform
    }
}

fn sysctl_raw(name: &str, buf: Option<&mut [u8]>) -> Option<usize> {
    let cname = CString::new(name).ok()?;
    let (ptr, mut len) = match buf {
        Some(b) => (b.as_mut_ptr() as *mut libc::c_void, b.len()),
        None => (std::ptr::null_mut(), 0),
    };
    let rc = unsafe {
        libc::sysctlbyname(cname.as_ptr(), ptr, &mut len, std::ptr::null_mut(), 0)
    };
    if rc == 0 { Some(len) } else { None }
}

fn sysctl_string(name: &str) -> Option<String> {
    let size = sysctl_raw(name, None)?;
    if size == 0 {
        return None;
    }
    let mut buf = vec![0u8; size];
    let len = sysctl_raw(name, Some(&mut buf))?;
    buf.truncate(len);
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let value = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    if value.is_empty() { None } else { Some(value) }
}

fn sysctl_u64(name: &str) -> Option<u64> {
    let mut buf = [0u8; 8];
    let len = sysctl_raw(name, Some(&mut buf))?;
    match len {
        8 => Some(u64::from_ne_bytes(buf)),
        4 => Some(u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64),
        _ => None,
    }
}

fn page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { FALLBACK_PAGE_SIZE }
}

#[allow(deprecated)] // libc points at mach2 for mach_host_self
fn vm_page_counts() -> Option<PageCounts> {
    let mut stats: libc::vm_statistics64 = unsafe { mem::zeroed() };
    let mut count = (mem::size_of::<libc::vm_statistics64>() / mem::size_of::<libc::integer_t>())
        as libc::mach_msg_type_number_t;
    let result = unsafe {
        libc::host_statistics64(
            libc::mach_host_self(),
            libc::HOST_VM_INFO64,
            &mut stats as *mut libc::vm_statistics64 as libc::host_info64_t,
            &mut count,
        )
    };
    if result != libc::KERN_SUCCESS {
        return None;
    }
    Some(PageCounts {
        active: stats.active_count as u64,
        wired: stats.wire_count as u64,
        compressed: stats.compressor_page_count as u64,
    })
}

impl HostCounters for Platform {
    fn cpu_brand(&mut self) -> Option<String> {
        sysctl_string("machdep.cpu.brand_string")
    }

    fn cpu_base_freq_mhz(&mut self) -> Option<f64> {
        // Not exposed on Apple Silicon; only Intel Macs answer this.
        sysctl_u64("hw.cpufrequency").map(|hz| hz as f64 / 1_000_000.0)
    }

    fn physical_memory(&mut self) -> Option<u64> {
        sysctl_u64("hw.memsize")
    }

    fn used_memory(&mut self) -> Option<u64> {
        vm_page_counts().map(|pages| pages.used_bytes(page_size()))
    }
}
