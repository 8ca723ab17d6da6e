//! Physical addressing and the hardware-facing interfaces consumed by the core.
//!
//! - [`PhysAddr`]: a physical address
//! - [`VirtToPhysResolver`]: translation of virtual to physical addresses,
//!   with [`LinuxPageMap`] as the `/proc/self/pagemap` implementation
//! - [`LatencyOracle`]: pairwise access latency measurement
mod latency;
mod virt_to_phys;

pub use self::latency::LatencyOracle;
pub use self::virt_to_phys::PhysAddr;
pub use self::virt_to_phys::{LinuxPageMap, LinuxPageMapError, VirtToPhysResolver};
