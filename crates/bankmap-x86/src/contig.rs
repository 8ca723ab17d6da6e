use std::fs::File;
use std::io::Read;
use std::ptr::null_mut;

use bankmap_core::config::MeasureConfig;
use bankmap_core::memory::{LinuxPageMap, LinuxPageMapError, PhysAddr, VirtToPhysResolver};
use bankmap_core::util::{GB, PAGE_SIZE};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use thiserror::Error;

const MEMINFO_PATH: &str = "/proc/meminfo";
const TOKEN: &str = "Hugepagesize:";

lazy_static! {
    static ref HUGEPAGE_SIZE: Option<usize> = {
        let mut s = String::new();
        File::open(MEMINFO_PATH)
            .and_then(|mut f| f.read_to_string(&mut s))
            .ok()?;
        parse_hugepage_size(&s)
    };
}

/// Extracts the default hugepage size in bytes from `/proc/meminfo` contents.
fn parse_hugepage_size(meminfo: &str) -> Option<usize> {
    let line = meminfo.lines().find_map(|l| l.strip_prefix(TOKEN))?;
    let mut parts = line.split_whitespace();
    let value = parts.next()?.parse::<usize>().ok()?;
    let unit = match parts.next() {
        Some("kB") => 1 << 10,
        Some("MB") => 1 << 20,
        _ => 1,
    };
    Some(value * unit)
}

/// Returns the index of the first run of `pages` physically adjacent frames.
fn find_contiguous_run(frames: &[u64], pages: usize) -> Option<usize> {
    if pages == 0 || frames.len() < pages {
        return None;
    }
    let mut start = 0;
    for i in 1..frames.len() {
        if i - start >= pages {
            break;
        }
        if frames[i] != frames[i - 1] + 1 {
            start = i;
        }
    }
    (frames.len() - start >= pages).then_some(start)
}

/// Errors that can occur while allocating contiguous memory.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Mapping or locking memory failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Translating addresses failed
    #[error(transparent)]
    PageMap(#[from] LinuxPageMapError),
    /// The request does not fit a hugepage
    #[error("{requested} bytes exceed the hugepage size of {hugepage:?} bytes")]
    TooLarge {
        /// Requested bytes
        requested: usize,
        /// Detected hugepage size
        hugepage: Option<usize>,
    },
    /// No physically contiguous block was found
    #[error("no physically contiguous block of {0} bytes found")]
    NotFound(usize),
}

/// A mapped region whose first `len` bytes are physically contiguous.
///
/// Unmapped on drop.
pub struct ContiguousBlock {
    map: *mut u8,
    map_len: usize,
    offset: usize,
    len: usize,
    phys: PhysAddr,
}

impl ContiguousBlock {
    /// Allocates `config.mem_size` physically contiguous bytes.
    ///
    /// Uses a 1 GB hugepage if `config.hugepage` is set, otherwise maps regions
    /// of twice the requested size up to `config.mmap_attempts` times and
    /// searches each for a contiguous run.
    ///
    /// # Errors
    ///
    /// Returns an error if no contiguous block can be obtained.
    pub fn allocate(config: &MeasureConfig) -> Result<Self, AllocError> {
        let mut pagemap = LinuxPageMap::new()?;
        if config.hugepage {
            Self::hugepage(config.mem_size, &mut pagemap)
        } else {
            Self::probe(config.mem_size, config.mmap_attempts, &mut pagemap)
        }
    }

    fn hugepage(len: usize, pagemap: &mut LinuxPageMap) -> Result<Self, AllocError> {
        let hugepage = *HUGEPAGE_SIZE;
        if hugepage != Some(GB) || len > GB {
            return Err(AllocError::TooLarge {
                requested: len,
                hugepage,
            });
        }
        let map = mmap(
            GB,
            libc::MAP_PRIVATE
                | libc::MAP_ANONYMOUS
                | libc::MAP_POPULATE
                | libc::MAP_HUGETLB
                | (30 << libc::MAP_HUGE_SHIFT),
        )?;
        let phys = pagemap.get_phys(map as u64)?;
        info!("Hugepage at {:p}, phys 0x{:x}", map, phys);
        Ok(ContiguousBlock {
            map,
            map_len: GB,
            offset: 0,
            len,
            phys,
        })
    }

    fn probe(len: usize, attempts: usize, pagemap: &mut LinuxPageMap) -> Result<Self, AllocError> {
        let pages = len.div_ceil(PAGE_SIZE);
        let map_len = 2 * pages * PAGE_SIZE;
        for attempt in 0..attempts {
            let map = mmap(
                map_len,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_POPULATE,
            )?;
            if unsafe { libc::mlock(map as *const libc::c_void, map_len) } != 0 {
                let e = std::io::Error::last_os_error();
                munmap(map, map_len);
                return Err(e.into());
            }
            let frames = (0..map_len / PAGE_SIZE)
                .map(|p| {
                    pagemap
                        .get_phys(map as u64 + (p * PAGE_SIZE) as u64)
                        .map(|a| a.as_u64() >> PAGE_SIZE.trailing_zeros())
                })
                .collect::<Result<Vec<_>, _>>();
            let frames = match frames {
                Ok(frames) => frames,
                Err(e) => {
                    munmap(map, map_len);
                    return Err(e.into());
                }
            };
            if let Some(start) = find_contiguous_run(&frames, pages) {
                let offset = start * PAGE_SIZE;
                let phys = PhysAddr::new(frames[start] << PAGE_SIZE.trailing_zeros());
                info!(
                    "Found {} contiguous pages after {} attempts at phys 0x{:x}",
                    pages,
                    attempt + 1,
                    phys
                );
                return Ok(ContiguousBlock {
                    map,
                    map_len,
                    offset,
                    len,
                    phys,
                });
            }
            debug!("Attempt {}: no contiguous run", attempt + 1);
            munmap(map, map_len);
        }
        Err(AllocError::NotFound(len))
    }

    /// Start of the contiguous region.
    pub fn ptr(&self) -> *mut u8 {
        unsafe { self.map.add(self.offset) }
    }

    /// Length of the contiguous region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical address of the region start.
    pub fn phys(&self) -> PhysAddr {
        self.phys
    }
}

impl Drop for ContiguousBlock {
    fn drop(&mut self) {
        munmap(self.map, self.map_len);
    }
}

fn mmap(len: usize, flags: libc::c_int) -> std::io::Result<*mut u8> {
    let p = unsafe {
        libc::mmap(
            null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };
    if p == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    unsafe { libc::memset(p, 0, len) };
    Ok(p as *mut u8)
}

fn munmap(p: *mut u8, len: usize) {
    if unsafe { libc::munmap(p as *mut libc::c_void, len) } != 0 {
        warn!("munmap failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hugepage_size() {
        let meminfo = "HugePages_Total:       1\nHugepagesize:    1048576 kB\nHugetlb: 0 kB\n";
        assert_eq!(parse_hugepage_size(meminfo), Some(GB));
        assert_eq!(parse_hugepage_size("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn test_contiguous_run() {
        assert_eq!(find_contiguous_run(&[5, 6, 7, 8], 4), Some(0));
        assert_eq!(find_contiguous_run(&[9, 1, 2, 3, 7], 3), Some(1));
        assert_eq!(find_contiguous_run(&[1, 2, 4, 5], 3), None);
        assert_eq!(find_contiguous_run(&[1, 3, 5, 6], 2), Some(2));
        assert_eq!(find_contiguous_run(&[1], 0), None);
    }
}
