/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: usize = 12;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
/// Mask for extracting page offset
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Smallest assumed bank size. Entries are spaced by at least this much.
pub const MIN_BANK_SIZE: usize = 1 << 12;

/// One mebibyte
pub const MB: usize = 1 << 20;
/// One gibibyte
pub const GB: usize = 1 << 30;

/// Width of a physical address in bits
pub const ADDR_BITS: usize = u64::BITS as usize;

/// Marker that opens a new group in a sample file
pub const BANK_MARKER: &str = "Bank";
