//! Linux x86-64 hardware layer for bankmap.
//!
//! - [`RdtscOracle`]: [`bankmap_core::memory::LatencyOracle`] timed with `rdtsc` and `clflush`
//! - [`CpuGuard`]: core pinning and prefetcher control, restored on drop
//! - [`ContiguousBlock`]: physically contiguous memory from hugepages or mmap probing
//!
//! Most operations require root privileges and the `msr` kernel module.

#![warn(missing_docs)]

mod contig;
mod cpu;
mod timer;

pub use contig::{AllocError, ContiguousBlock};
pub use cpu::{CpuError, CpuGuard};
pub use timer::RdtscOracle;
