use std::fmt::{Debug, Formatter};

use crate::util::{PAGE_MASK, PAGE_SHIFT};
use log::warn;
use pagemap2::{PageMapError, VirtualMemoryArea};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physical memory address.
///
/// A newtype wrapper around a 64-bit physical address value.
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct PhysAddr(u64);

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("PhysAddr(0x{:x})", self.0))
    }
}

impl std::fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl PhysAddr {
    /// Creates a new physical address.
    pub const fn new(addr: u64) -> Self {
        PhysAddr(addr)
    }

    /// Returns the raw address value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns bit `index` of the address.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below 64.
    pub fn bit(&self, index: usize) -> u64 {
        assert!(index < u64::BITS as usize, "bit index {} out of range", index);
        (self.0 >> index) & 1
    }
}

impl From<u64> for PhysAddr {
    fn from(addr: u64) -> Self {
        PhysAddr(addr)
    }
}

impl From<PhysAddr> for u64 {
    fn from(addr: PhysAddr) -> u64 {
        addr.0
    }
}

/// Trait for resolving virtual addresses to physical addresses.
pub trait VirtToPhysResolver {
    /// Errors that can occur during physical address resolution
    type Error;

    /// Translates a virtual address to a physical address.
    ///
    /// # Errors
    ///
    /// Returns an error if address translation fails.
    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, Self::Error>;
}

/// Errors that can happen during PageMap operations
#[derive(Debug, Error)]
#[error(transparent)]
pub struct LinuxPageMapError(#[from] PageMapError);

/// Virtual to physical address translator backed by `/proc/{pid}/pagemap`.
///
/// Reading PFNs requires root; unprivileged reads return PFN 0.
pub struct LinuxPageMap {
    pagemap_wrapper: pagemap2::PageMap,
}

impl LinuxPageMap {
    /// Opens the pagemap of the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if opening `/proc/self/pagemap` fails.
    pub fn new() -> Result<LinuxPageMap, LinuxPageMapError> {
        Ok(LinuxPageMap {
            pagemap_wrapper: pagemap2::PageMap::new(std::process::id() as u64)?,
        })
    }
}

impl VirtToPhysResolver for LinuxPageMap {
    type Error = LinuxPageMapError;

    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, Self::Error> {
        let page = virt & !(PAGE_MASK as u64);
        let region = VirtualMemoryArea::from((page, page + PAGE_MASK as u64));
        let entries = self.pagemap_wrapper.pagemap_vma(&region)?;
        assert_eq!(
            entries.len(),
            1,
            "Got {} pagemap entries for virtual address 0x{:x}, expected exactly one",
            entries.len(),
            virt
        );
        let pfn = entries[0].pfn()?;
        if pfn == 0 {
            warn!(
                "Got invalid PFN 0 for virtual address 0x{:x}. Are we root?",
                virt
            );
        }
        Ok(PhysAddr((pfn << PAGE_SHIFT) | (virt & PAGE_MASK as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::PhysAddr;

    #[test]
    fn test_bit_extraction() {
        let addr = PhysAddr::new(0b1010_0000_0000_0000);
        assert_eq!(addr.bit(13), 1);
        assert_eq!(addr.bit(14), 0);
        assert_eq!(addr.bit(15), 1);
        assert_eq!(addr.bit(63), 0);
    }

    #[test]
    #[should_panic]
    fn test_bit_out_of_range() {
        PhysAddr::new(1).bit(64);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", PhysAddr::new(0x4000)), "PhysAddr(0x4000)");
    }
}
