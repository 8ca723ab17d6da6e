use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;

use log::{info, warn};
use thiserror::Error;

/// MSR controlling the hardware prefetchers among other features.
const IA32_MISC_ENABLE: u64 = 0x1a4;
/// Setting these bits disables the L2 and L1 prefetchers.
const PREFETCH_DISABLE_BITS: u64 = 0xf;

/// Errors that can occur while preparing the CPU for measurements.
#[derive(Debug, Error)]
pub enum CpuError {
    /// The requested core does not exist
    #[error("invalid core {core}, {available} cores online")]
    InvalidCore {
        /// Requested core
        core: usize,
        /// Number of online cores
        available: usize,
    },
    /// Setting the CPU affinity failed
    #[error("could not set process affinity: {0}")]
    Affinity(std::io::Error),
    /// Accessing the MSR device failed
    #[error("could not access {path} (run 'modprobe msr' as root): {source}")]
    Msr {
        /// MSR device path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Keeps the process on one core with prefetching disabled.
///
/// The previous `IA32_MISC_ENABLE` value is written back when the guard is
/// dropped, including on early returns and unwinding.
pub struct CpuGuard {
    core: usize,
    saved: Option<(File, u64)>,
}

impl CpuGuard {
    /// Pins to `core` (default: last online core) and optionally disables the prefetchers.
    ///
    /// # Errors
    ///
    /// Returns an error if the core is invalid, pinning fails or the MSR cannot be accessed.
    pub fn acquire(core: Option<usize>, disable_prefetch: bool) -> Result<Self, CpuError> {
        let available = online_cpus();
        let core = core.unwrap_or(available.saturating_sub(1));
        if core >= available {
            return Err(CpuError::InvalidCore { core, available });
        }
        pin_to(core)?;
        info!("Running on core {}", core);

        let saved = if disable_prefetch {
            let path = format!("/dev/cpu/{}/msr", core);
            let msr_err = |source: std::io::Error| CpuError::Msr {
                path: path.clone(),
                source,
            };
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(msr_err)?;
            let old = read_msr(&file).map_err(msr_err)?;
            info!("Old MSR: 0x{:x}", old);
            write_msr(&file, old | PREFETCH_DISABLE_BITS).map_err(msr_err)?;
            info!("New MSR: 0x{:x}", old | PREFETCH_DISABLE_BITS);
            Some((file, old))
        } else {
            None
        };
        Ok(CpuGuard { core, saved })
    }

    /// The core the process is pinned to.
    pub fn core(&self) -> usize {
        self.core
    }
}

impl Drop for CpuGuard {
    fn drop(&mut self) {
        if let Some((file, old)) = &self.saved {
            match write_msr(file, *old) {
                Ok(()) => info!("Restored MSR: 0x{:x}", old),
                Err(e) => warn!("Could not restore prefetch settings: {}", e),
            }
        }
    }
}

fn online_cpus() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 { 1 } else { n as usize }
}

fn pin_to(core: usize) -> Result<(), CpuError> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(CpuError::Affinity(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

fn read_msr(file: &File) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact_at(&mut buf, IA32_MISC_ENABLE)?;
    Ok(u64::from_ne_bytes(buf))
}

fn write_msr(file: &File, value: u64) -> std::io::Result<()> {
    file.write_all_at(&value.to_ne_bytes(), IA32_MISC_ENABLE)
}
