/// Measures the access latency of a pair of memory locations.
///
/// Implementations alternate accesses to both locations with cache flushes in
/// between, so every access is served from DRAM. A high average latency hints
/// at a row conflict: both locations live in the same bank but different rows.
pub trait LatencyOracle {
    /// Returns the noise-filtered average latency of accessing `a` and `b` back to back.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid for reads for the duration of the call.
    unsafe fn measure_latency(&self, a: *const u8, b: *const u8) -> f64;
}

impl<F> LatencyOracle for F
where
    F: Fn(*const u8, *const u8) -> f64,
{
    unsafe fn measure_latency(&self, a: *const u8, b: *const u8) -> f64 {
        self(a, b)
    }
}
